// Frame executor
//
// One cycle = one frame: wait fence -> reset fence -> acquire -> record ->
// submit -> present. A single frame is in flight; the CPU only blocks on
// the fence wait.

use crate::error::{FrameError, FrameStage};
use crate::platform::SurfaceProvider;
use ash::prelude::VkResult;
use std::time::{Duration, Instant};

/// The GPU operations one frame cycle is made of.
///
/// The Vulkan renderer implements this; tests drive the executor with a
/// scripted backend instead.
pub trait FrameBackend {
    /// Number of swapchain images; acquired indices must be below it
    fn image_count(&self) -> u32;

    /// Block until the previous frame's submission has finished
    fn wait_frame_fence(&mut self) -> VkResult<()>;
    fn reset_frame_fence(&mut self) -> VkResult<()>;

    /// Returns (image index, suboptimal)
    fn acquire_next_image(&mut self) -> VkResult<(u32, bool)>;
    fn record_draw(&mut self, image_index: u32) -> VkResult<()>;
    fn submit(&mut self) -> VkResult<()>;

    /// Returns whether the swapchain is suboptimal
    fn present(&mut self, image_index: u32) -> VkResult<bool>;

    /// Signal the frame fence without doing any work, so a cycle that reset
    /// the fence but never submitted does not deadlock the next wait.
    fn rearm_frame_fence(&mut self) -> VkResult<()>;

    fn wait_idle(&mut self) -> VkResult<()>;
}

/// Outcome of one presented frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStatus {
    pub image_index: u32,
    pub suboptimal: bool,
}

/// Totals for a whole run of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub skipped: u64,
}

/// Rolling frame rate for the window title
pub struct FpsCounter {
    base_title: String,
    frame_count: u32,
    last_update: Instant,
    last_frame: Instant,
}

impl FpsCounter {
    pub const INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(base_title: impl Into<String>, now: Instant) -> Self {
        Self {
            base_title: base_title.into(),
            frame_count: 0,
            last_update: now,
            last_frame: now,
        }
    }

    /// Count a frame; once per interval returns the title to show
    pub fn tick(&mut self, now: Instant) -> Option<String> {
        let frame_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_update);
        if elapsed < Self::INTERVAL {
            return None;
        }

        let fps = self.frame_count as f32 / elapsed.as_secs_f32();
        self.frame_count = 0;
        self.last_update = now;

        Some(format!(
            "{} - {:.0} FPS ({:.2}ms)",
            self.base_title,
            fps,
            frame_time * 1000.0
        ))
    }
}

pub struct FrameExecutor<B: FrameBackend> {
    backend: B,
    fps: Option<FpsCounter>,
    suboptimal_reported: bool,
}

impl<B: FrameBackend> FrameExecutor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            fps: None,
            suboptimal_reported: false,
        }
    }

    /// Show FPS and frame time in the window title, prefixed by `base_title`
    pub fn with_fps_title(mut self, base_title: impl Into<String>) -> Self {
        self.fps = Some(FpsCounter::new(base_title, Instant::now()));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one full cycle.
    ///
    /// An out-of-date surface comes back as a recoverable error. If it happens
    /// at acquire the fence has already been reset, so it is re-armed first.
    pub fn draw_frame(&mut self) -> Result<FrameStatus, FrameError> {
        self.backend
            .wait_frame_fence()
            .map_err(|e| FrameError::from_vk(FrameStage::Wait, e))?;
        self.backend
            .reset_frame_fence()
            .map_err(|e| FrameError::from_vk(FrameStage::Reset, e))?;

        let (image_index, acquire_suboptimal) = match self.backend.acquire_next_image() {
            Ok(acquired) => acquired,
            Err(result) => {
                let err = FrameError::from_vk(FrameStage::Acquire, result);
                if err.is_recoverable() {
                    self.backend
                        .rearm_frame_fence()
                        .map_err(|e| FrameError::from_vk(FrameStage::Submit, e))?;
                }
                return Err(err);
            }
        };

        let count = self.backend.image_count();
        if image_index >= count {
            return Err(FrameError::ImageIndexOutOfRange {
                index: image_index,
                count,
            });
        }

        self.backend
            .record_draw(image_index)
            .map_err(|e| FrameError::from_vk(FrameStage::Record, e))?;
        self.backend
            .submit()
            .map_err(|e| FrameError::from_vk(FrameStage::Submit, e))?;
        let present_suboptimal = self
            .backend
            .present(image_index)
            .map_err(|e| FrameError::from_vk(FrameStage::Present, e))?;

        let status = FrameStatus {
            image_index,
            suboptimal: acquire_suboptimal || present_suboptimal,
        };

        if status.suboptimal && !self.suboptimal_reported {
            log::warn!("Swapchain is suboptimal for the surface; continuing without recreation");
            self.suboptimal_reported = true;
        }

        Ok(status)
    }

    /// Drive frames until the window asks to close.
    ///
    /// Out-of-date frames are skipped and counted. Any other failure stops
    /// the loop. The device is waited idle on every exit path.
    pub fn run<S: SurfaceProvider + ?Sized>(&mut self, window: &mut S) -> Result<FrameStats, FrameError> {
        let mut stats = FrameStats::default();

        let outcome = loop {
            if window.should_close() {
                break Ok(());
            }
            window.poll_events();

            match self.draw_frame() {
                Ok(_) => {
                    stats.presented += 1;
                    if let Some(fps) = self.fps.as_mut() {
                        if let Some(title) = fps.tick(Instant::now()) {
                            window.set_title(&title);
                        }
                    }
                }
                Err(e) if e.is_recoverable() => {
                    if stats.skipped == 0 {
                        log::warn!("Skipping frame: {}", e);
                    } else {
                        log::debug!("Skipping frame: {}", e);
                    }
                    stats.skipped += 1;
                }
                Err(e) => break Err(e),
            }
        };

        let idle = self.backend.wait_idle();

        match outcome {
            Ok(()) => {
                idle.map_err(|e| FrameError::from_vk(FrameStage::Idle, e))?;
                Ok(stats)
            }
            Err(e) => {
                if let Err(idle_err) = idle {
                    log::warn!("device_wait_idle failed after frame error: {}", idle_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InitError;
    use ash::vk;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::ffi::CStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait,
        Reset,
        Acquire,
        Record(u32),
        Submit,
        Present(u32),
        Rearm,
        Idle,
    }

    /// Records every call; acquire/present results are scripted per frame
    struct RecordingBackend {
        calls: Vec<Call>,
        images: u32,
        next_index: u32,
        acquire_script: VecDeque<VkResult<(u32, bool)>>,
        present_script: VecDeque<VkResult<bool>>,
        fence_signaled: bool,
    }

    impl RecordingBackend {
        fn new(images: u32) -> Self {
            Self {
                calls: Vec::new(),
                images,
                next_index: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fence_signaled: true,
            }
        }
    }

    impl FrameBackend for RecordingBackend {
        fn image_count(&self) -> u32 {
            self.images
        }

        fn wait_frame_fence(&mut self) -> VkResult<()> {
            self.calls.push(Call::Wait);
            // A wait on an unsignaled fence with nothing pending never returns
            assert!(self.fence_signaled, "waited on a fence that can never signal");
            Ok(())
        }

        fn reset_frame_fence(&mut self) -> VkResult<()> {
            self.calls.push(Call::Reset);
            self.fence_signaled = false;
            Ok(())
        }

        fn acquire_next_image(&mut self) -> VkResult<(u32, bool)> {
            self.calls.push(Call::Acquire);
            if let Some(scripted) = self.acquire_script.pop_front() {
                return scripted;
            }
            let index = self.next_index;
            self.next_index = (self.next_index + 1) % self.images;
            Ok((index, false))
        }

        fn record_draw(&mut self, image_index: u32) -> VkResult<()> {
            self.calls.push(Call::Record(image_index));
            Ok(())
        }

        fn submit(&mut self) -> VkResult<()> {
            self.calls.push(Call::Submit);
            self.fence_signaled = true;
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> VkResult<bool> {
            self.calls.push(Call::Present(image_index));
            self.present_script.pop_front().unwrap_or(Ok(false))
        }

        fn rearm_frame_fence(&mut self) -> VkResult<()> {
            self.calls.push(Call::Rearm);
            self.fence_signaled = true;
            Ok(())
        }

        fn wait_idle(&mut self) -> VkResult<()> {
            self.calls.push(Call::Idle);
            Ok(())
        }
    }

    /// Closes after a fixed number of event polls
    struct FakeWindow {
        polls_left: u32,
        polls: u32,
        titles: RefCell<Vec<String>>,
    }

    impl FakeWindow {
        fn closing_after(polls: u32) -> Self {
            Self {
                polls_left: polls,
                polls: 0,
                titles: RefCell::new(Vec::new()),
            }
        }
    }

    impl SurfaceProvider for FakeWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            (800, 600)
        }

        fn should_close(&self) -> bool {
            self.polls_left == 0
        }

        fn poll_events(&mut self) {
            self.polls += 1;
            self.polls_left = self.polls_left.saturating_sub(1);
        }

        fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>, InitError> {
            Ok(Vec::new())
        }

        fn create_surface(&self, _entry: &ash::Entry, _instance: &ash::Instance) -> Result<vk::SurfaceKHR, InitError> {
            Err(InitError::UnsupportedPlatform("test window".into()))
        }

        fn set_title(&self, title: &str) {
            self.titles.borrow_mut().push(title.to_owned());
        }
    }

    #[test]
    fn one_cycle_runs_steps_in_order() {
        let mut executor = FrameExecutor::new(RecordingBackend::new(3));

        let status = executor.draw_frame().unwrap();

        assert_eq!(
            status,
            FrameStatus {
                image_index: 0,
                suboptimal: false
            }
        );
        assert_eq!(
            executor.backend().calls,
            vec![
                Call::Wait,
                Call::Reset,
                Call::Acquire,
                Call::Record(0),
                Call::Submit,
                Call::Present(0)
            ]
        );
    }

    #[test]
    fn recorded_and_presented_index_matches_acquired() {
        let mut backend = RecordingBackend::new(3);
        backend.acquire_script.push_back(Ok((2, false)));
        let mut executor = FrameExecutor::new(backend);

        let status = executor.draw_frame().unwrap();

        assert_eq!(status.image_index, 2);
        let calls = &executor.backend().calls;
        assert!(calls.contains(&Call::Record(2)));
        assert!(calls.contains(&Call::Present(2)));
    }

    #[test]
    fn index_beyond_image_count_is_fatal_and_records_nothing() {
        let mut backend = RecordingBackend::new(2);
        backend.acquire_script.push_back(Ok((2, false)));
        let mut executor = FrameExecutor::new(backend);

        let err = executor.draw_frame().unwrap_err();

        assert!(matches!(err, FrameError::ImageIndexOutOfRange { index: 2, count: 2 }));
        assert!(!err.is_recoverable());
        assert!(!executor
            .backend()
            .calls
            .iter()
            .any(|c| matches!(c, Call::Record(_) | Call::Submit)));
    }

    #[test]
    fn out_of_date_acquire_rearms_fence() {
        let mut backend = RecordingBackend::new(3);
        backend
            .acquire_script
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        let mut executor = FrameExecutor::new(backend);

        let err = executor.draw_frame().unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(
            executor.backend().calls,
            vec![Call::Wait, Call::Reset, Call::Acquire, Call::Rearm]
        );

        // Next cycle's wait must not deadlock
        executor.draw_frame().unwrap();
    }

    #[test]
    fn suboptimal_is_reported_but_frame_presented() {
        let mut backend = RecordingBackend::new(3);
        backend.acquire_script.push_back(Ok((1, true)));
        backend.present_script.push_back(Ok(true));
        let mut executor = FrameExecutor::new(backend);

        let status = executor.draw_frame().unwrap();
        assert!(status.suboptimal);
        assert!(executor.backend().calls.contains(&Call::Present(1)));

        let status = executor.draw_frame().unwrap();
        assert!(!status.suboptimal);
    }

    #[test]
    fn run_draws_until_close_then_waits_idle() {
        const FRAMES: usize = 7;
        const IMAGES: u32 = 3;
        let mut window = FakeWindow::closing_after(FRAMES as u32);
        let mut executor = FrameExecutor::new(RecordingBackend::new(IMAGES));

        let stats = executor.run(&mut window).unwrap();

        assert_eq!(
            stats,
            FrameStats {
                presented: FRAMES as u64,
                skipped: 0
            }
        );
        assert_eq!(window.polls, FRAMES as u32);

        let calls = &executor.backend().calls;
        assert_eq!(calls.len(), FRAMES * 6 + 1);
        assert_eq!(calls.last(), Some(&Call::Idle));

        // Every cycle waits on and resets the fence before it acquires
        let cycles: Vec<&[Call]> = calls[..FRAMES * 6].chunks(6).collect();
        assert_eq!(cycles.len(), FRAMES);
        for (n, cycle) in cycles.iter().enumerate() {
            assert_eq!(&cycle[..3], &[Call::Wait, Call::Reset, Call::Acquire], "cycle {}", n);
            let Call::Record(index) = cycle[3] else {
                panic!("cycle {} did not record after acquire: {:?}", n, cycle);
            };
            assert!(index < IMAGES, "cycle {} acquired {}", n, index);
            assert_eq!(&cycle[3..], &[Call::Record(index), Call::Submit, Call::Present(index)]);
        }

        let presented: Vec<u32> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Present(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(presented, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn closed_window_draws_nothing() {
        let mut window = FakeWindow::closing_after(0);
        let mut executor = FrameExecutor::new(RecordingBackend::new(3));

        let stats = executor.run(&mut window).unwrap();

        assert_eq!(stats, FrameStats::default());
        assert_eq!(executor.backend().calls, vec![Call::Idle]);
    }

    #[test]
    fn out_of_date_frames_are_skipped_and_loop_continues() {
        let mut backend = RecordingBackend::new(3);
        backend.acquire_script.push_back(Ok((0, false)));
        backend
            .acquire_script
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        backend
            .present_script
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        let mut window = FakeWindow::closing_after(3);
        let mut executor = FrameExecutor::new(backend);

        let stats = executor.run(&mut window).unwrap();

        // frame 1: present out of date, frame 2: acquire out of date
        assert_eq!(stats, FrameStats { presented: 1, skipped: 2 });
    }

    #[test]
    fn device_lost_stops_loop_and_still_waits_idle() {
        let mut backend = RecordingBackend::new(3);
        backend.acquire_script.push_back(Ok((0, false)));
        backend.acquire_script.push_back(Err(vk::Result::ERROR_DEVICE_LOST));
        let mut window = FakeWindow::closing_after(10);
        let mut executor = FrameExecutor::new(backend);

        let err = executor.run(&mut window).unwrap_err();

        assert!(matches!(err, FrameError::DeviceLost { stage: FrameStage::Acquire }));
        assert_eq!(window.polls, 2);
        let calls = &executor.backend().calls;
        assert!(!calls.contains(&Call::Rearm));
        assert_eq!(calls.last(), Some(&Call::Idle));
    }

    #[test]
    fn fps_title_updates_once_per_interval() {
        let start = Instant::now();
        let mut fps = FpsCounter::new("Vulkan", start);

        assert_eq!(fps.tick(start + Duration::from_millis(400)), None);
        assert_eq!(fps.tick(start + Duration::from_millis(800)), None);

        let title = fps.tick(start + Duration::from_millis(1000)).unwrap();
        assert!(title.starts_with("Vulkan - 3 FPS"), "{}", title);
        assert!(title.ends_with("(200.00ms)"), "{}", title);

        assert_eq!(fps.tick(start + Duration::from_millis(1500)), None);
    }
}
