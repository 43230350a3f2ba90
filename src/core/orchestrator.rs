// src/core/orchestrator.rs
//
// Dispatch of the applicable analyzers for one file, the shared worker pool
// for batches, per-file deadlines and aggregation into a DetectionReport.

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::analysis::{
    analyze_chi_square, analyze_echo_hiding, analyze_lsb_pairs, analyze_metadata, analyze_phase_coding,
    analyze_rs, carve, CarvingScan,
};
use super::buffer::SampleBuffer;
use super::cancel::CancelToken;
use super::decoder::{CodecDecoder, MediaDecoder};
use super::media::{MediaFile, MediaKind};
use crate::config::{AudioMethod, DetectionConfig, DetectionMethod, ImageMethod};
use crate::detection::{DetectionReport, Finding, MethodFailure, Verdict};
use crate::error::{DetectionError, Result};

/// Poll interval while waiting for a large-input slot
const GATE_POLL: Duration = Duration::from_millis(20);

/// Bounds the number of memory-heavy analyses in flight across the pool
#[derive(Debug)]
struct LargeBufferGate {
    limit: usize,
    inflight: Mutex<usize>,
    released: Condvar,
}

struct GateGuard<'a> {
    gate: &'a LargeBufferGate,
}

impl LargeBufferGate {
    fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            inflight: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    /// Wait for a slot; gives up when the file's deadline passes
    fn acquire(&self, cancel: &CancelToken) -> Result<GateGuard<'_>> {
        let mut inflight = self.inflight.lock();
        while *inflight >= self.limit {
            cancel.checkpoint()?;
            self.released.wait_for(&mut inflight, GATE_POLL);
        }
        *inflight += 1;
        Ok(GateGuard { gate: self })
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut inflight = self.gate.inflight.lock();
        *inflight = inflight.saturating_sub(1);
        self.gate.released.notify_one();
    }
}

enum Outcome {
    Findings(Vec<Finding>),
    Carved(CarvingScan),
    Failed(MethodFailure),
}

struct MethodRun {
    method: DetectionMethod,
    outcome: Outcome,
}

impl MethodRun {
    fn failed(method: DetectionMethod, error: &DetectionError) -> Self {
        Self {
            method,
            outcome: Outcome::Failed(MethodFailure::from_error(method, error)),
        }
    }
}

/// Result of one path in a batch
#[derive(Debug)]
pub struct BatchOutcome {
    pub path: PathBuf,
    pub result: Result<DetectionReport>,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    config: DetectionConfig,
    decoder: Option<Arc<dyn MediaDecoder>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: DetectionConfig::default(),
            decoder: None,
        }
    }

    pub fn config(mut self, config: DetectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default codec-backed decoder
    pub fn decoder(mut self, decoder: impl MediaDecoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;
        let mut pool = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("stegcheckr-{}", i));
        if let Some(workers) = self.config.workers {
            pool = pool.num_threads(workers);
        }
        let pool = pool
            .build()
            .map_err(|e| DetectionError::Config(format!("failed to build worker pool: {}", e)))?;
        Ok(Orchestrator {
            gate: LargeBufferGate::new(self.config.max_large_inflight),
            decoder: self.decoder.unwrap_or_else(|| Arc::new(CodecDecoder::new())),
            config: self.config,
            pool,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs every enabled analyzer for a file and assembles the report.
///
/// Analyzer failures never abort the run; they are recorded in the report's
/// failure list. Only an unloadable file, an unknown media kind or a decoder
/// that rejects the container outright fail the whole file.
pub struct Orchestrator {
    config: DetectionConfig,
    decoder: Arc<dyn MediaDecoder>,
    pool: rayon::ThreadPool,
    gate: LargeBufferGate,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn new(config: DetectionConfig) -> Result<Self> {
        OrchestratorBuilder::new().config(config).build()
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn analyze_path(&self, path: &Path) -> Result<DetectionReport> {
        let media = MediaFile::load(path)?;
        self.analyze_media(&media)
    }

    pub fn analyze_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<DetectionReport> {
        self.analyze_media(&MediaFile::from_bytes(name, bytes))
    }

    pub fn analyze_media(&self, media: &MediaFile) -> Result<DetectionReport> {
        self.analyze_media_with(media, &CancelToken::new())
    }

    /// Like [`analyze_media`](Self::analyze_media), stopping pending analyzers
    /// once `cancel` is cancelled; they are recorded as "cancelled" failures.
    /// The configured per-file deadline still applies on top.
    pub fn analyze_media_with(&self, media: &MediaFile, cancel: &CancelToken) -> Result<DetectionReport> {
        self.pool.install(|| self.run_file(media, cancel))
    }

    pub fn analyze_batch(&self, paths: &[PathBuf]) -> Vec<BatchOutcome> {
        self.analyze_batch_with(paths, |_| {})
    }

    /// Analyze files concurrently; `on_done` is called as each file finishes.
    /// Outcomes are returned in input order.
    pub fn analyze_batch_with<F>(&self, paths: &[PathBuf], on_done: F) -> Vec<BatchOutcome>
    where
        F: Fn(&BatchOutcome) + Sync,
    {
        self.analyze_batch_cancellable(paths, &CancelToken::new(), on_done)
    }

    /// Batch analysis under a caller-held token shared by every file
    pub fn analyze_batch_cancellable<F>(&self, paths: &[PathBuf], cancel: &CancelToken, on_done: F) -> Vec<BatchOutcome>
    where
        F: Fn(&BatchOutcome) + Sync,
    {
        self.pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let outcome = BatchOutcome {
                        path: path.clone(),
                        result: MediaFile::load(path).and_then(|media| self.run_file(&media, cancel)),
                    };
                    if let Err(e) = &outcome.result {
                        warn!("{}: {}", path.display(), e);
                    }
                    on_done(&outcome);
                    outcome
                })
                .collect()
        })
    }

    fn run_file(&self, media: &MediaFile, batch: &CancelToken) -> Result<DetectionReport> {
        let started = Instant::now();
        let kind = media.kind().ok_or_else(|| {
            DetectionError::UnsupportedFormat(format!("{}: unrecognized media kind", media.name()))
        })?;
        let cancel = batch.child(self.config.timeout_ms);

        let (raw, sampled): (Vec<DetectionMethod>, Vec<DetectionMethod>) = DetectionMethod::for_kind(kind)
            .into_iter()
            .filter(|m| self.config.is_enabled(*m))
            .partition(|m| !m.needs_samples());
        debug!(
            "{}: {} {} ({} bytes), methods {:?}",
            media.name(),
            kind,
            media.format(),
            media.len(),
            raw.iter().chain(&sampled).map(|m| m.name()).collect::<Vec<_>>()
        );

        let (raw_runs, sampled_runs) = rayon::join(
            || {
                raw.par_iter()
                    .map(|&method| self.run_raw(method, media, &cancel))
                    .collect::<Vec<_>>()
            },
            || self.run_sampled(&sampled, media, &cancel),
        );
        let mut runs = raw_runs;
        runs.extend(sampled_runs?);
        runs.sort_by_key(|r| r.method);

        let report = self.assemble(media, kind, runs);
        info!(
            "{}: {} ({} findings, {} embedded, {} failed) in {:.1?}",
            report.file,
            report.verdict,
            report.findings.len(),
            report.embedded_files.len(),
            report.failures.len(),
            started.elapsed()
        );
        Ok(report)
    }

    /// Methods over the raw bytes
    fn run_raw(&self, method: DetectionMethod, media: &MediaFile, cancel: &CancelToken) -> MethodRun {
        let started = Instant::now();
        let outcome = match method {
            // structural scan bounded by the file size; not subject to the deadline
            DetectionMethod::Metadata if cancel.is_cancelled() => Err(DetectionError::Cancelled),
            DetectionMethod::Metadata => Ok(Outcome::Findings(analyze_metadata(media, &self.config.metadata))),
            DetectionMethod::Carving => self.guarded(media.len(), cancel, || {
                carve(media, &self.config.carving, cancel).map(Outcome::Carved)
            }),
            other => Err(DetectionError::UnsupportedFormat(format!(
                "{} needs a decoded sample buffer",
                other
            ))),
        };
        self.finish(method, media, started, outcome)
    }

    /// Decode once, then run the sample-buffer methods concurrently
    fn run_sampled(&self, methods: &[DetectionMethod], media: &MediaFile, cancel: &CancelToken) -> Result<Vec<MethodRun>> {
        if methods.is_empty() {
            return Ok(Vec::new());
        }
        if let Err(e) = cancel.checkpoint() {
            return Ok(methods.iter().map(|&m| MethodRun::failed(m, &e)).collect());
        }
        let started = Instant::now();
        let buffer = match self.decoder.decode(media) {
            Ok(buffer) => buffer,
            Err(e @ DetectionError::UnsupportedFormat(_)) => return Err(e),
            Err(e) => {
                warn!("{}: decoding failed: {}", media.name(), e);
                return Ok(methods.iter().map(|&m| MethodRun::failed(m, &e)).collect());
            }
        };
        debug!("{}: decoded in {:.1?}", media.name(), started.elapsed());

        Ok(methods
            .par_iter()
            .map(|&method| {
                let started = Instant::now();
                let outcome = self.run_on_buffer(method, &buffer, cancel);
                self.finish(method, media, started, outcome)
            })
            .collect())
    }

    fn run_on_buffer(&self, method: DetectionMethod, buffer: &SampleBuffer, cancel: &CancelToken) -> Result<Outcome> {
        let config = &self.config;
        let finding = match method {
            DetectionMethod::Image(image) => {
                cancel.checkpoint()?;
                let planes = buffer.as_image()?;
                match image {
                    ImageMethod::LsbPairs => analyze_lsb_pairs(planes, &config.lsb_pairs, cancel),
                    ImageMethod::ChiSquare => analyze_chi_square(planes, &config.chi_square, cancel),
                    ImageMethod::Rs => analyze_rs(planes, &config.rs, config.seed, cancel),
                }
            }
            DetectionMethod::Audio(audio) => {
                let pcm = buffer.as_audio()?;
                self.guarded(buffer.byte_size(), cancel, || match audio {
                    AudioMethod::PhaseCoding => analyze_phase_coding(pcm, &config.phase, cancel),
                    AudioMethod::EchoHiding => analyze_echo_hiding(pcm, &config.echo, cancel),
                })
            }
            other => Err(DetectionError::UnsupportedFormat(format!("{} does not use a sample buffer", other))),
        }?;
        Ok(Outcome::Findings(vec![finding]))
    }

    /// Run `f`, holding a large-input slot when `size` crosses the threshold
    fn guarded<T>(&self, size: u64, cancel: &CancelToken, f: impl FnOnce() -> Result<T>) -> Result<T> {
        cancel.checkpoint()?;
        if size >= self.config.large_input_bytes {
            let _slot = self.gate.acquire(cancel)?;
            f()
        } else {
            f()
        }
    }

    fn finish(&self, method: DetectionMethod, media: &MediaFile, started: Instant, outcome: Result<Outcome>) -> MethodRun {
        match outcome {
            Ok(outcome) => {
                debug!("{}: {} finished in {:.1?}", media.name(), method, started.elapsed());
                MethodRun { method, outcome }
            }
            Err(e) => {
                warn!("{}: {} failed after {:.1?}: {}", media.name(), method, started.elapsed(), e);
                MethodRun::failed(method, &e)
            }
        }
    }

    fn assemble(&self, media: &MediaFile, kind: MediaKind, runs: Vec<MethodRun>) -> DetectionReport {
        let mut findings = Vec::new();
        let mut embedded_files = Vec::new();
        let mut trailing_bytes = None;
        let mut methods_run = Vec::new();
        let mut failures = Vec::new();

        for run in runs {
            match run.outcome {
                Outcome::Findings(found) => {
                    methods_run.push(run.method);
                    findings.extend(found);
                }
                Outcome::Carved(scan) => {
                    methods_run.push(run.method);
                    trailing_bytes = Some(scan.trailing_bytes);
                    embedded_files.extend(scan.embedded);
                }
                Outcome::Failed(failure) => failures.push(failure),
            }
        }

        DetectionReport {
            file: media.name().to_string(),
            content_hash: media.content_hash().to_string(),
            media_kind: kind,
            format: media.format(),
            byte_len: media.len(),
            verdict: Verdict::derive(&findings, &embedded_files, &self.config.verdict),
            findings,
            embedded_files,
            trailing_bytes,
            methods_run,
            failures,
            seed: self.config.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::{ChannelPlane, PcmBuffer, PixelPlanes};
    use crate::core::container::png::tests::{chunk, png_with};
    use crate::detection::FailureReason;

    /// Hands out a fixed buffer regardless of the bytes
    struct FixedDecoder(SampleBuffer);

    impl MediaDecoder for FixedDecoder {
        fn decode(&self, _media: &MediaFile) -> Result<SampleBuffer> {
            Ok(self.0.clone())
        }
    }

    struct FailingDecoder(fn() -> DetectionError);

    impl MediaDecoder for FailingDecoder {
        fn decode(&self, _media: &MediaFile) -> Result<SampleBuffer> {
            Err((self.0)())
        }
    }

    fn gradient_planes() -> SampleBuffer {
        let data: Vec<u8> = (0..64 * 64).map(|i| ((i % 64) * 2 + (i / 64)) as u8).collect();
        SampleBuffer::Image(PixelPlanes::new(64, 64, vec![ChannelPlane::new("L", 64, 64, data).unwrap()]).unwrap())
    }

    fn orchestrator(decoder: impl MediaDecoder + 'static) -> Orchestrator {
        let config = DetectionConfig {
            workers: Some(2),
            ..DetectionConfig::default()
        };
        Orchestrator::builder().config(config).decoder(decoder).build().unwrap()
    }

    #[test]
    fn test_image_dispatch_and_order() {
        let orch = orchestrator(FixedDecoder(gradient_planes()));
        let report = orch.analyze_bytes("a.png", png_with(&[])).unwrap();
        assert_eq!(
            report.methods_run,
            vec![
                DetectionMethod::Metadata,
                DetectionMethod::LSB_PAIRS,
                DetectionMethod::CHI_SQUARE,
                DetectionMethod::RS,
                DetectionMethod::Carving,
            ]
        );
        assert!(report.failures.is_empty());
        assert_eq!(report.trailing_bytes, Some(0));
        let methods: Vec<DetectionMethod> = report.findings.iter().map(|f| f.method).collect();
        let mut sorted = methods.clone();
        sorted.sort();
        assert_eq!(methods, sorted);
    }

    #[test]
    fn test_corrupt_buffer_fails_only_sample_methods() {
        let orch = orchestrator(FailingDecoder(|| DetectionError::CorruptMedia("bad IDAT".into())));
        let png = png_with(&[chunk(b"tEXt", &[b"Comment\0".as_slice(), &[b'x'; 10_000]].concat())]);
        let report = orch.analyze_bytes("a.png", png).unwrap();
        assert_eq!(report.methods_run, vec![DetectionMethod::Metadata, DetectionMethod::Carving]);
        assert_eq!(report.failures.len(), 3);
        assert!(report.failures.iter().all(|f| f.reason == FailureReason::CorruptMedia));
        assert_eq!(report.verdict, Verdict::Detected);
    }

    #[test]
    fn test_unsupported_decoder_is_fatal() {
        let orch = orchestrator(FailingDecoder(|| DetectionError::UnsupportedFormat("progressive".into())));
        let err = orch.analyze_bytes("a.png", png_with(&[])).unwrap_err();
        assert!(matches!(err, DetectionError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_unknown_kind_is_fatal() {
        let orch = orchestrator(FixedDecoder(gradient_planes()));
        assert!(orch.analyze_bytes("notes.txt", b"hello".to_vec()).is_err());
    }

    #[test]
    fn test_disabled_methods_are_skipped() {
        let config = DetectionConfig {
            disabled_methods: vec![DetectionMethod::RS, DetectionMethod::Carving],
            ..DetectionConfig::default()
        };
        let orch = Orchestrator::builder()
            .config(config)
            .decoder(FixedDecoder(gradient_planes()))
            .build()
            .unwrap();
        let report = orch.analyze_bytes("a.png", png_with(&[])).unwrap();
        assert!(!report.methods_run.contains(&DetectionMethod::RS));
        assert!(report.failure(DetectionMethod::RS).is_none());
        assert_eq!(report.trailing_bytes, None);
    }

    #[test]
    fn test_mismatched_buffer_kind_is_recorded() {
        let pcm = PcmBuffer::new(8000, 1, 16, vec![0; 16]).unwrap();
        let orch = orchestrator(FixedDecoder(SampleBuffer::Audio(pcm)));
        let report = orch.analyze_bytes("a.png", png_with(&[])).unwrap();
        let failure = report.failure(DetectionMethod::CHI_SQUARE).unwrap();
        assert_eq!(failure.reason, FailureReason::UnsupportedFormat);
    }

    #[test]
    fn test_cancelled_token_fails_every_method() {
        let orch = orchestrator(FixedDecoder(gradient_planes()));
        let cancel = CancelToken::new();
        cancel.cancel();
        let media = MediaFile::from_bytes("a.png", png_with(&[]));
        let report = orch.analyze_media_with(&media, &cancel).unwrap();

        assert!(report.methods_run.is_empty());
        assert_eq!(report.failures.len(), 5);
        assert!(report.failures.iter().all(|f| f.reason == FailureReason::Cancelled));
        assert_eq!(report.verdict, Verdict::Clean);
    }

    #[test]
    fn test_live_token_runs_normally() {
        let orch = orchestrator(FixedDecoder(gradient_planes()));
        let media = MediaFile::from_bytes("a.png", png_with(&[]));
        let report = orch.analyze_media_with(&media, &CancelToken::new()).unwrap();
        assert_eq!(report.methods_run.len(), 5);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_gate_bounds_inflight() {
        let gate = LargeBufferGate::new(1);
        let cancel = CancelToken::with_deadline(50);
        let held = gate.acquire(&cancel).unwrap();
        let err = gate.acquire(&cancel).err().unwrap();
        assert!(matches!(err, DetectionError::Timeout { .. }));
        drop(held);
        assert!(gate.acquire(&CancelToken::new()).is_ok());
    }
}
