pub mod composition;
pub mod draw_plan;
pub mod geometry;
pub mod shadow;

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PassError {
    #[error("Failed to allocate command buffers: {0}")]
    AllocateCommandBuffersFailed(String),

    #[error("Failed to record command buffer: {0}")]
    RecordFailed(String),
}

/// Lifecycle of a prerecorded command buffer. Only `Recorded` buffers may be
/// submitted; toggles drive Recorded -> Draining -> Stale -> Recorded, with
/// device quiescence between Draining and Stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandState {
    #[default]
    Uninitialized,
    Recorded,
    Draining,
    Stale,
}

impl CommandState {
    pub fn is_submittable(self) -> bool {
        self == CommandState::Recorded
    }

    pub fn can_transition(self, to: CommandState) -> bool {
        use CommandState::*;
        matches!(
            (self, to),
            (Uninitialized, Recorded)
                | (Recorded, Draining)
                | (Draining, Stale)
                | (Stale, Recorded)
        )
    }

    /// Moves to `to`, asserting the transition is one the rebuild protocol
    /// allows.
    pub fn advance(&mut self, to: CommandState) {
        debug_assert!(
            self.can_transition(to),
            "illegal command state transition {:?} -> {:?}",
            self,
            to
        );
        *self = to;
    }
}

pub(crate) fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>, PassError> {
    let info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);
    unsafe {
        device
            .allocate_command_buffers(&info)
            .map_err(|e| PassError::AllocateCommandBuffersFailed(e.to_string()))
    }
}

pub(crate) fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport::default()
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
}

pub(crate) fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D::default().extent(extent)
}

#[cfg(test)]
mod tests {
    use super::CommandState::*;

    #[test]
    fn only_recorded_buffers_are_submittable() {
        assert!(Recorded.is_submittable());
        for state in [Uninitialized, Draining, Stale] {
            assert!(!state.is_submittable());
        }
    }

    #[test]
    fn rebuild_protocol_is_the_only_cycle() {
        assert!(Uninitialized.can_transition(Recorded));
        assert!(Recorded.can_transition(Draining));
        assert!(Draining.can_transition(Stale));
        assert!(Stale.can_transition(Recorded));

        // No shortcuts: a draining buffer cannot be re-recorded directly.
        assert!(!Draining.can_transition(Recorded));
        assert!(!Recorded.can_transition(Stale));
        assert!(!Uninitialized.can_transition(Draining));
        assert!(!Stale.can_transition(Draining));
    }

    #[test]
    fn full_rebuild_round_trip() {
        let mut state = super::CommandState::default();
        state.advance(Recorded);
        state.advance(Draining);
        state.advance(Stale);
        state.advance(Recorded);
        assert!(state.is_submittable());
    }
}
