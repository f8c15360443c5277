//! Occlusion scan over a display's stack list.
//!
//! Walks the display front to back from the top, stopping at the queried
//! stack. Fullscreen stacks occlude everything below unless translucent; the
//! split-screen halves only occlude their own half, so both must be opaque to
//! hide a fullscreen stack beneath them.

use crate::hierarchy::Hierarchy;
use crate::types::{ActivityId, ActivityType, StackId, StackVisibility, WindowingMode};

/// Whether nothing in `stack` currently draws opaque content.
///
/// Only activities that are visible (ignoring keyguard) or being started count.
pub fn is_stack_translucent(
    hierarchy: &Hierarchy,
    stack: StackId,
    starting: Option<ActivityId>,
) -> bool {
    let Ok(record) = hierarchy.stack(stack) else {
        return true;
    };
    if record.force_hidden {
        return true;
    }
    for activity in hierarchy.activities_in_stack_top_down(stack) {
        let Ok(activity) = hierarchy.activity(activity) else {
            continue;
        };
        if activity.finishing {
            continue;
        }
        if !activity.visible_ignoring_keyguard && Some(activity.id) != starting {
            continue;
        }
        if activity.occludes_parent {
            return false;
        }
    }
    true
}

fn stack_contains(hierarchy: &Hierarchy, stack: StackId, activity: Option<ActivityId>) -> bool {
    activity
        .and_then(|id| hierarchy.stack_of_activity(id).ok())
        .is_some_and(|owner| owner == stack)
}

/// Classifies `stack` as visible, visible behind translucency, or occluded.
///
/// `recents_animation_running` keeps the split-screen primary visible under a
/// fullscreen assistant while the overview animation plays.
pub fn stack_visibility(
    hierarchy: &Hierarchy,
    stack: StackId,
    starting: Option<ActivityId>,
    recents_animation_running: bool,
) -> StackVisibility {
    let Ok(record) = hierarchy.stack(stack) else {
        return StackVisibility::Invisible;
    };
    if record.force_hidden {
        return StackVisibility::Invisible;
    }
    let Ok(display) = hierarchy.display(record.display) else {
        return StackVisibility::Invisible;
    };

    let windowing_mode = record.windowing_mode;
    let is_assistant = record.activity_type == ActivityType::Assistant;

    let mut got_split_screen_stack = false;
    let mut got_opaque_primary = false;
    let mut got_opaque_secondary = false;
    let mut got_translucent_fullscreen = false;
    let mut got_translucent_primary = false;
    let mut got_translucent_secondary = false;
    let mut should_be_visible = true;

    for other_id in display.stacks_top_down() {
        let has_running = hierarchy.has_running_activity(other_id);
        if other_id == stack {
            should_be_visible =
                has_running || stack_contains(hierarchy, stack, starting) || record.is_home();
            break;
        }
        if !has_running {
            continue;
        }
        let Ok(other) = hierarchy.stack(other_id) else {
            continue;
        };

        match other.windowing_mode {
            WindowingMode::Fullscreen => {
                // Home is not resizable in split-screen and the assistant
                // rides over an overview animation; neither hides the primary.
                if windowing_mode == WindowingMode::SplitScreenPrimary
                    && (other.activity_type == ActivityType::Home
                        || (other.activity_type == ActivityType::Assistant
                            && recents_animation_running))
                {
                    break;
                }
                if is_stack_translucent(hierarchy, other_id, starting) {
                    got_translucent_fullscreen = true;
                    continue;
                }
                return StackVisibility::Invisible;
            }
            WindowingMode::SplitScreenPrimary if !got_opaque_primary => {
                got_split_screen_stack = true;
                got_translucent_primary = is_stack_translucent(hierarchy, other_id, starting);
                got_opaque_primary = !got_translucent_primary;
                if windowing_mode == WindowingMode::SplitScreenPrimary && got_opaque_primary {
                    return StackVisibility::Invisible;
                }
            }
            WindowingMode::SplitScreenSecondary if !got_opaque_secondary => {
                got_split_screen_stack = true;
                got_translucent_secondary = is_stack_translucent(hierarchy, other_id, starting);
                got_opaque_secondary = !got_translucent_secondary;
                if windowing_mode == WindowingMode::SplitScreenSecondary && got_opaque_secondary {
                    return StackVisibility::Invisible;
                }
            }
            _ => {}
        }

        if got_opaque_primary && got_opaque_secondary {
            return StackVisibility::Invisible;
        }
        // Assistant surfaces are z-boosted; never show them behind split-screen.
        if is_assistant && got_split_screen_stack {
            return StackVisibility::Invisible;
        }
    }

    if !should_be_visible {
        return StackVisibility::Invisible;
    }

    let behind_translucent_split = match windowing_mode {
        WindowingMode::Fullscreen => got_translucent_primary || got_translucent_secondary,
        WindowingMode::SplitScreenPrimary => got_translucent_primary,
        WindowingMode::SplitScreenSecondary => got_translucent_secondary,
        _ => false,
    };
    if behind_translucent_split || got_translucent_fullscreen {
        StackVisibility::VisibleBehindTranslucent
    } else {
        StackVisibility::Visible
    }
}
