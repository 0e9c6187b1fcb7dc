use ash::khr::swapchain;
use ash::vk;
use thiserror::Error;

use atrium_render_vulkan_core::vulkan::sync::{SyncError, create_fence, create_semaphore};

use crate::config::LIGHT_COUNT;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Failed to wait for the in-flight fence: {0}")]
    FenceWaitFailed(String),

    #[error("Failed to acquire a swapchain image: {0}")]
    AcquireFailed(String),

    #[error("Failed to submit command buffers: {0}")]
    SubmitFailed(String),

    #[error("Failed to present: {0}")]
    PresentFailed(String),

    #[error("The swapchain no longer matches the surface")]
    SwapchainOutOfDate,

    #[error("Frame submitted without waiting out the previous frame")]
    FrameNotWaited,
}

/// Where the frame stands relative to the single in-flight fence. Host
/// writes to the per-frame uniform blocks are only safe in `Writable`:
/// until the fence signals, the previous frame's passes may still be
/// reading them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameGate {
    Waiting,
    Writable,
}

impl FrameGate {
    pub fn allows_submit(self) -> bool {
        matches!(self, FrameGate::Writable)
    }
}

/// A point in the frame's semaphore chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPoint {
    ImageAvailable,
    ShadowDone(usize),
    GeometryDone,
    RenderComplete,
}

/// One queue submission: waits on one semaphore, signals one semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    pub wait: ChainPoint,
    pub signal: ChainPoint,
}

/// The frame's submission order: every shadow pass in sequence, then the
/// G-buffer pass, then composition. Strictly linear, no fan-out.
pub fn submission_chain(light_count: usize) -> Vec<ChainLink> {
    let mut links = Vec::with_capacity(light_count + 2);
    let mut previous = ChainPoint::ImageAvailable;
    for i in 0..light_count {
        links.push(ChainLink {
            wait: previous,
            signal: ChainPoint::ShadowDone(i),
        });
        previous = ChainPoint::ShadowDone(i);
    }
    links.push(ChainLink {
        wait: previous,
        signal: ChainPoint::GeometryDone,
    });
    links.push(ChainLink {
        wait: ChainPoint::GeometryDone,
        signal: ChainPoint::RenderComplete,
    });
    links
}

/// Command buffers submitted for one frame.
pub struct FrameWork<'a> {
    pub shadow: &'a [vk::CommandBuffer],
    pub geometry: vk::CommandBuffer,
    /// One per swapchain image; the acquired index picks the buffer.
    pub composition: &'a [vk::CommandBuffer],
}

/// Owns the per-frame synchronization primitives and runs the submission
/// chain. A single fence on the last submit throttles the CPU to one frame
/// in flight.
pub struct FrameScheduler {
    device: ash::Device,
    image_available: vk::Semaphore,
    shadow_done: [vk::Semaphore; LIGHT_COUNT],
    geometry_done: vk::Semaphore,
    render_complete: vk::Semaphore,
    in_flight: vk::Fence,
    gate: FrameGate,
}

impl FrameScheduler {
    pub fn new(device: &ash::Device) -> Result<Self, SchedulerError> {
        let mut shadow_done = [vk::Semaphore::null(); LIGHT_COUNT];
        for slot in &mut shadow_done {
            *slot = create_semaphore(device)?;
        }
        Ok(Self {
            device: device.clone(),
            image_available: create_semaphore(device)?,
            shadow_done,
            geometry_done: create_semaphore(device)?,
            render_complete: create_semaphore(device)?,
            in_flight: create_fence(device, true)?,
            gate: FrameGate::Waiting,
        })
    }

    /// Blocks until the previous frame's composition submit retires. Must
    /// run before any per-frame uniform write; `draw` refuses to submit
    /// otherwise.
    pub fn wait_frame(&mut self) -> Result<(), SchedulerError> {
        unsafe {
            self.device
                .wait_for_fences(&[self.in_flight], true, u64::MAX)
                .map_err(|e| SchedulerError::FenceWaitFailed(e.to_string()))?;
        }
        self.gate = FrameGate::Writable;
        Ok(())
    }

    fn semaphore(&self, point: ChainPoint) -> vk::Semaphore {
        match point {
            ChainPoint::ImageAvailable => self.image_available,
            ChainPoint::ShadowDone(i) => self.shadow_done[i],
            ChainPoint::GeometryDone => self.geometry_done,
            ChainPoint::RenderComplete => self.render_complete,
        }
    }

    /// Acquires an image, submits the whole chain and presents. Returns the
    /// acquired image index.
    pub fn draw(
        &mut self,
        queue: vk::Queue,
        swapchain_loader: &swapchain::Device,
        swapchain: vk::SwapchainKHR,
        work: &FrameWork,
    ) -> Result<u32, SchedulerError> {
        if !self.gate.allows_submit() {
            return Err(SchedulerError::FrameNotWaited);
        }

        let (image_index, _suboptimal) = unsafe {
            swapchain_loader
                .acquire_next_image(
                    swapchain,
                    u64::MAX,
                    self.image_available,
                    vk::Fence::null(),
                )
                .map_err(|e| match e {
                    vk::Result::ERROR_OUT_OF_DATE_KHR => SchedulerError::SwapchainOutOfDate,
                    other => SchedulerError::AcquireFailed(other.to_string()),
                })?
        };

        // Reset only once the chain is certain to be submitted; an
        // out-of-date acquire must leave the fence signaled for the retry.
        unsafe {
            self.device
                .reset_fences(&[self.in_flight])
                .map_err(|e| SchedulerError::FenceWaitFailed(e.to_string()))?;
        }
        self.gate = FrameGate::Waiting;

        let links = submission_chain(work.shadow.len());
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        for (step, link) in links.iter().enumerate() {
            let command_buffer = match step {
                i if i < work.shadow.len() => work.shadow[i],
                i if i == work.shadow.len() => work.geometry,
                _ => work.composition[image_index as usize],
            };
            let wait = self.semaphore(link.wait);
            let signal = self.semaphore(link.signal);
            let submit = vk::SubmitInfo::default()
                .wait_semaphores(std::slice::from_ref(&wait))
                .wait_dst_stage_mask(std::slice::from_ref(&wait_stage))
                .command_buffers(std::slice::from_ref(&command_buffer))
                .signal_semaphores(std::slice::from_ref(&signal));
            // The composition submit carries the fence.
            let fence = if link.signal == ChainPoint::RenderComplete {
                self.in_flight
            } else {
                vk::Fence::null()
            };
            unsafe {
                self.device
                    .queue_submit(queue, std::slice::from_ref(&submit), fence)
                    .map_err(|e| SchedulerError::SubmitFailed(e.to_string()))?;
            }
        }

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(std::slice::from_ref(&self.render_complete))
            .swapchains(std::slice::from_ref(&swapchain))
            .image_indices(std::slice::from_ref(&image_index));
        unsafe {
            swapchain_loader
                .queue_present(queue, &present_info)
                .map_err(|e| match e {
                    vk::Result::ERROR_OUT_OF_DATE_KHR => SchedulerError::SwapchainOutOfDate,
                    other => SchedulerError::PresentFailed(other.to_string()),
                })?;
        }

        Ok(image_index)
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.image_available, None);
            for semaphore in self.shadow_done {
                self.device.destroy_semaphore(semaphore, None);
            }
            self.device.destroy_semaphore(self.geometry_done, None);
            self.device.destroy_semaphore(self.render_complete, None);
            self.device.destroy_fence(self.in_flight, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_has_one_link_per_shadow_pass_plus_two() {
        assert_eq!(submission_chain(3).len(), 5);
        assert_eq!(submission_chain(1).len(), 3);
    }

    #[test]
    fn chain_without_shadow_passes_starts_at_geometry() {
        let links = submission_chain(0);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].wait, ChainPoint::ImageAvailable);
        assert_eq!(links[0].signal, ChainPoint::GeometryDone);
        assert_eq!(links[1].signal, ChainPoint::RenderComplete);
    }

    #[test]
    fn uniform_writes_only_happen_behind_the_fence_wait() {
        // Submitting while the previous frame may still be on the GPU would
        // let host uniform writes race the in-flight passes.
        assert!(!FrameGate::Waiting.allows_submit());
        assert!(FrameGate::Writable.allows_submit());
    }

    #[test]
    fn chain_is_strictly_linear() {
        let links = submission_chain(LIGHT_COUNT);
        assert_eq!(links[0].wait, ChainPoint::ImageAvailable);
        for pair in links.windows(2) {
            assert_eq!(pair[0].signal, pair[1].wait);
        }
        assert_eq!(
            links.last().map(|l| l.signal),
            Some(ChainPoint::RenderComplete)
        );
    }

    #[test]
    fn every_signal_is_unique() {
        let links = submission_chain(LIGHT_COUNT);
        for (i, a) in links.iter().enumerate() {
            for b in links.iter().skip(i + 1) {
                assert_ne!(a.signal, b.signal);
            }
        }
    }
}
