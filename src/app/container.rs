use std::sync::Arc;

use crate::adapters::{FfmpegEncoderProbe, FfmpegRunner};
use crate::app::export_queue::ExportQueue;
use crate::config::ExporterConfig;
use crate::domain::model::ExportSettings;
use crate::planner::{resolve_encoder, RenderContext};
use crate::ports::{EncoderProbe, ProcessRunner};

pub trait AppContainer: Send + Sync {
    fn config(&self) -> &ExporterConfig;
    fn process_runner(&self) -> Arc<dyn ProcessRunner>;
    fn encoder_probe(&self) -> Arc<dyn EncoderProbe>;

    /// Start an export queue wired to this container's ports
    fn start_export_queue(&self) -> ExportQueue {
        ExportQueue::spawn(
            self.config().queue_settings(),
            self.process_runner(),
            self.encoder_probe(),
        )
    }
}

pub struct DefaultAppContainer {
    config: ExporterConfig,
    runner: Arc<dyn ProcessRunner>,
    probe: Arc<dyn EncoderProbe>,
}

impl DefaultAppContainer {
    /// Wire the ffmpeg-backed adapters
    pub fn new(config: ExporterConfig) -> Self {
        let runner = Arc::new(
            FfmpegRunner::new(&config.ffmpeg_path).with_timeout(config.process_timeout()),
        );
        let probe = Arc::new(FfmpegEncoderProbe::new(&config.ffmpeg_path));
        Self {
            config,
            runner,
            probe,
        }
    }

    /// Wire caller-provided ports, e.g. fakes in tests
    pub fn with_ports(
        config: ExporterConfig,
        runner: Arc<dyn ProcessRunner>,
        probe: Arc<dyn EncoderProbe>,
    ) -> Self {
        Self {
            config,
            runner,
            probe,
        }
    }

    /// Render context a job with these settings would get
    pub async fn render_context(&self, settings: &ExportSettings) -> RenderContext {
        RenderContext {
            encoder: resolve_encoder(self.probe.as_ref(), settings).await,
            canvas: self.config.canvas(),
        }
    }
}

impl AppContainer for DefaultAppContainer {
    fn config(&self) -> &ExporterConfig {
        &self.config
    }

    fn process_runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }

    fn encoder_probe(&self) -> Arc<dyn EncoderProbe> {
        Arc::clone(&self.probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::domain::model::HardwareAccel;
    use crate::engine::ProcessHandle;
    use crate::error::{ExportError, ExportResult};
    use crate::ports::{Invocation, ProgressFn};

    struct NoRunner;

    #[async_trait]
    impl ProcessRunner for NoRunner {
        async fn run(&self, _: &Invocation, _: &ProcessHandle, _: ProgressFn<'_>) -> ExportResult<()> {
            Err(ExportError::Cancelled)
        }
    }

    struct Accels(Vec<HardwareAccel>);

    #[async_trait]
    impl EncoderProbe for Accels {
        async fn available_accels(&self) -> ExportResult<Vec<HardwareAccel>> {
            Ok(self.0.clone())
        }
    }

    fn container(accels: Vec<HardwareAccel>) -> DefaultAppContainer {
        DefaultAppContainer::with_ports(
            ExporterConfig::default(),
            Arc::new(NoRunner),
            Arc::new(Accels(accels)),
        )
    }

    #[tokio::test]
    async fn test_render_context_uses_probed_encoder() {
        let container = container(vec![HardwareAccel::Software, HardwareAccel::Nvenc]);
        let settings = ExportSettings {
            hardware_accel: HardwareAccel::Nvenc,
            ..ExportSettings::default()
        };
        let ctx = container.render_context(&settings).await;
        assert_eq!(ctx.encoder.name, "h264_nvenc");
    }

    #[tokio::test]
    async fn test_render_context_falls_back_to_software() {
        let container = container(vec![HardwareAccel::Software]);
        let settings = ExportSettings {
            hardware_accel: HardwareAccel::Nvenc,
            ..ExportSettings::default()
        };
        let ctx = container.render_context(&settings).await;
        assert_eq!(ctx.encoder.name, "libx264");
        assert_eq!(ctx.encoder.accel, HardwareAccel::Software);
    }

    #[tokio::test]
    async fn test_queue_starts_from_config() {
        let queue = container(vec![HardwareAccel::Software]).start_export_queue();
        assert_eq!(queue.queued_count().await.unwrap(), 0);
        queue.shutdown().await.unwrap();
    }
}
