//! Audio logger task
//!
//! One background task owns every filesystem mutation in the log
//! directory. Sessions submit sealed utterances over a bounded channel and
//! never wait on the disk; when the channel is full the utterance is
//! dropped with a warning rather than stalling recognition.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::config::SharedAudioLogConfig;
use crate::rotator::Rotator;
use crate::writer::write_pair;

/// Periodic sweep interval: catches files added outside the service.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Submission queue bound.
const QUEUE_CAPACITY: usize = 64;

struct LogJob {
    session_id: u64,
    samples: Arc<[f32]>,
}

/// Cloneable handle to the logger task.
#[derive(Clone)]
pub struct AudioLogger {
    tx: mpsc::Sender<LogJob>,
}

impl AudioLogger {
    /// Spawn the logger task. Must be called on a tokio runtime.
    pub fn spawn(config: SharedAudioLogConfig) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run(config, rx));
        Self { tx }
    }

    /// Submit one utterance for persistence. Non-blocking; whether the
    /// pair is actually written depends on the config snapshot the task
    /// takes when it processes the job.
    pub fn log(&self, session_id: u64, samples: Arc<[f32]>) {
        let job = LogJob {
            session_id,
            samples,
        };
        if self.tx.try_send(job).is_err() {
            tracing::warn!(session_id, "audio log queue full, dropping utterance");
        }
    }
}

async fn run(config: SharedAudioLogConfig, mut rx: mpsc::Receiver<LogJob>) {
    let mut rotator = Rotator::new(config.snapshot().output_dir);
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            job = rx.recv() => {
                let Some(job) = job else { break };
                handle_job(&config, &mut rotator, job);
            }
            _ = sweep.tick() => {
                let snapshot = config.snapshot();
                if snapshot.enabled {
                    rotator.sync_dir(&snapshot.output_dir);
                    rotator.rescan();
                    rotator.enforce(snapshot.max_files);
                }
            }
        }
    }

    tracing::debug!("audio logger task exited");
}

fn handle_job(config: &SharedAudioLogConfig, rotator: &mut Rotator, job: LogJob) {
    // One snapshot per utterance; a concurrent admin change applies to the
    // next one.
    let snapshot = config.snapshot();
    if !snapshot.enabled {
        return;
    }

    rotator.sync_dir(&snapshot.output_dir);
    if let Err(err) = std::fs::create_dir_all(&snapshot.output_dir) {
        tracing::error!(
            dir = %snapshot.output_dir.display(),
            error = %err,
            "cannot create audio log directory"
        );
        return;
    }

    match write_pair(&snapshot.output_dir, Utc::now(), job.session_id, &job.samples) {
        Ok(pair) => {
            tracing::info!(
                session_id = job.session_id,
                path = %pair.raw_path.display(),
                samples = job.samples.len(),
                duration_secs = job.samples.len() as f64 / streamscribe_core::SAMPLE_RATE as f64,
                "audio log saved"
            );
            rotator.record(&pair);
            rotator.enforce(snapshot.max_files);
        }
        Err(err) => {
            // Storage failures are internal only; recognition already went
            // back to the client.
            tracing::error!(session_id = job.session_id, error = %err, "failed to write audio log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioLogConfig, AudioLogConfigUpdate};
    use tempfile::TempDir;

    fn shared(dir: &TempDir, max_files: usize) -> SharedAudioLogConfig {
        SharedAudioLogConfig::new(AudioLogConfig {
            enabled: true,
            output_dir: dir.path().to_path_buf(),
            max_files,
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    fn pair_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".raw"))
            .count()
    }

    #[tokio::test]
    async fn test_logger_writes_pairs() {
        let dir = TempDir::new().unwrap();
        let logger = AudioLogger::spawn(shared(&dir, 10));

        logger.log(1, Arc::from(vec![0.5f32; 1600].into_boxed_slice()));
        settle().await;

        assert_eq!(pair_count(&dir), 1);
    }

    #[tokio::test]
    async fn test_disabled_logger_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = shared(&dir, 10);
        config
            .apply(AudioLogConfigUpdate {
                enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        let logger = AudioLogger::spawn(config);

        logger.log(1, Arc::from(vec![0.5f32; 1600].into_boxed_slice()));
        settle().await;

        assert_eq!(pair_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_config_change_applies_to_next_utterance() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let config = shared(&dir_a, 10);
        let logger = AudioLogger::spawn(config.clone());

        logger.log(1, Arc::from(vec![0.1f32; 160].into_boxed_slice()));
        settle().await;

        config
            .apply(AudioLogConfigUpdate {
                output_dir: Some(dir_b.path().to_path_buf()),
                ..Default::default()
            })
            .unwrap();

        logger.log(1, Arc::from(vec![0.1f32; 160].into_boxed_slice()));
        settle().await;

        assert_eq!(pair_count(&dir_a), 1);
        assert_eq!(pair_count(&dir_b), 1);
    }

    #[tokio::test]
    async fn test_rotation_applies_after_publish() {
        let dir = TempDir::new().unwrap();
        let logger = AudioLogger::spawn(shared(&dir, 2));

        for i in 0..4u64 {
            logger.log(i, Arc::from(vec![0.1f32; 160].into_boxed_slice()));
            // Space submissions out so embedded timestamps differ.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        settle().await;

        assert!(pair_count(&dir) <= 2);
    }
}
