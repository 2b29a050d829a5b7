use crate::core::change::ChangeMapBuilder;
use crate::core::histogram::{HistogramBuilder, HistogramParams};
use crate::core::mask::{MaskParams, MaskPostProcessor};
use crate::core::otsu::otsu_threshold;
use crate::core::preprocess::{PreprocessParams, Preprocessor};
use crate::core::stats::aggregate_statistics;
use crate::types::{
    AreaStatistic, BinaryMask, CancelToken, ChangeMap, FloodError, FloodResult, RasterPair, Region,
};
use std::sync::Arc;

/// How the binarization threshold is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ThresholdMode {
    /// Always use the configured fixed threshold
    Fixed,
    /// Solve with Otsu's method, falling back to the fixed threshold when
    /// the histogram is degenerate
    Otsu,
}

/// Where the applied threshold actually came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ThresholdSource {
    Fixed,
    Otsu,
    /// Otsu was requested but degenerate; the fixed threshold was applied
    FixedFallback,
}

/// Detection parameters for a full pipeline run
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DetectionParams {
    pub preprocess: PreprocessParams,
    pub histogram: HistogramParams,
    pub mask: MaskParams,
    /// Threshold applied in fixed mode and as the Otsu fallback, in dB
    pub fixed_threshold_db: f64,
    pub threshold_mode: ThresholdMode,
    /// Band names to difference; `None` uses every derived dB band
    pub bands: Option<Vec<String>>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            preprocess: PreprocessParams::default(),
            histogram: HistogramParams::default(),
            mask: MaskParams::default(),
            fixed_threshold_db: -3.0,
            threshold_mode: ThresholdMode::Otsu,
            bands: None,
        }
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    ChangeMap,
    Threshold,
    Postprocess,
    Statistics,
}

/// Structured progress callbacks for a host UI or job runner
pub trait ProgressObserver: Send + Sync {
    fn stage_started(&self, _stage: Stage) {}
    fn stage_completed(&self, _stage: Stage) {}
}

/// Default observer that reports nothing
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// One flood event to analyze: an acquisition pair and the AOI
#[derive(Debug, Clone)]
pub struct FloodEvent {
    pub id: String,
    pub pair: RasterPair,
    pub region: Region,
}

/// Everything a detection run produces for one event
#[derive(Debug, Clone)]
pub struct FloodProduct {
    pub event_id: String,
    pub change: ChangeMap,
    pub mask: BinaryMask,
    pub statistic: AreaStatistic,
    pub threshold_db: f64,
    pub threshold_source: ThresholdSource,
}

/// Outcome of one event within a batch run
pub struct EventOutcome {
    pub event_id: String,
    pub result: FloodResult<FloodProduct>,
}

/// End-to-end flood detector.
///
/// Wires preprocessing, change mapping, threshold selection, mask cleanup
/// and aggregation for one event; [`FloodDetector::run_batch`] applies it
/// to several events, recording per-event failures without aborting the
/// batch.
pub struct FloodDetector {
    params: DetectionParams,
    observer: Arc<dyn ProgressObserver>,
}

impl FloodDetector {
    pub fn new(params: DetectionParams) -> Self {
        Self {
            params,
            observer: Arc::new(NoProgress),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Run the full pipeline for one event
    pub fn detect(&self, event: &FloodEvent, cancel: &CancelToken) -> FloodResult<FloodProduct> {
        log::info!("Detecting flood extent for event {}", event.id);

        let change = self.build_change_map(&event.pair, cancel)?;

        cancel.check()?;
        self.observer.stage_started(Stage::Threshold);
        let (threshold_db, threshold_source) = self.select_threshold(&change, &event.region)?;
        self.observer.stage_completed(Stage::Threshold);

        cancel.check()?;
        self.observer.stage_started(Stage::Postprocess);
        let post = MaskPostProcessor::with_params(self.params.mask.clone());
        let mask = post.apply(&change, threshold_db, cancel)?;
        self.observer.stage_completed(Stage::Postprocess);

        cancel.check()?;
        self.observer.stage_started(Stage::Statistics);
        let statistic = aggregate_statistics(&mask, &event.region, &event.id)?;
        self.observer.stage_completed(Stage::Statistics);

        Ok(FloodProduct {
            event_id: event.id.clone(),
            change,
            mask,
            statistic,
            threshold_db,
            threshold_source,
        })
    }

    /// Preprocess both acquisitions and difference them
    fn build_change_map(&self, pair: &RasterPair, cancel: &CancelToken) -> FloodResult<ChangeMap> {
        self.observer.stage_started(Stage::Preprocess);
        let preprocessor = Preprocessor::with_params(self.params.preprocess.clone());
        let pre = preprocessor.preprocess(pair.pre(), cancel)?;
        let post = preprocessor.preprocess(pair.post(), cancel)?;
        let prepared = RasterPair::new(pre, post)?;
        self.observer.stage_completed(Stage::Preprocess);

        cancel.check()?;
        self.observer.stage_started(Stage::ChangeMap);
        let change = ChangeMapBuilder::build(&prepared, self.params.bands.as_deref())?;
        self.observer.stage_completed(Stage::ChangeMap);
        Ok(change)
    }

    fn select_threshold(
        &self,
        change: &ChangeMap,
        region: &Region,
    ) -> FloodResult<(f64, ThresholdSource)> {
        match self.params.threshold_mode {
            ThresholdMode::Fixed => Ok((self.params.fixed_threshold_db, ThresholdSource::Fixed)),
            ThresholdMode::Otsu => {
                let histogram = HistogramBuilder::with_params(self.params.histogram.clone())
                    .build(change, region)?;
                match otsu_threshold(&histogram) {
                    Ok(threshold) => Ok((threshold, ThresholdSource::Otsu)),
                    Err(FloodError::HistogramDegenerate) => {
                        log::warn!(
                            "Degenerate histogram in region {}, falling back to fixed threshold {:.2} dB",
                            region.id,
                            self.params.fixed_threshold_db
                        );
                        Ok((self.params.fixed_threshold_db, ThresholdSource::FixedFallback))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Process a batch of events, continuing past per-event failures.
    ///
    /// Cancellation stops the batch after the event that observed it.
    pub fn run_batch(&self, events: &[FloodEvent], cancel: &CancelToken) -> Vec<EventOutcome> {
        log::info!("Running flood detection batch of {} event(s)", events.len());

        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            let result = self.detect(event, cancel);
            let cancelled = matches!(result, Err(FloodError::Cancelled));
            if let Err(e) = &result {
                log::warn!("Event {} failed: {}", event.id, e);
            }
            outcomes.push(EventOutcome {
                event_id: event.id.clone(),
                result,
            });
            if cancelled {
                break;
            }
        }
        outcomes
    }
}

impl Default for FloodDetector {
    fn default() -> Self {
        Self::new(DetectionParams::default())
    }
}
