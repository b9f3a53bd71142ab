//! MRZ presence probe
//!
//! A cheap check that the lower band of the guide holds machine-readable
//! zone text. It runs fast text recognition and looks for filler chevrons,
//! an issuing-state code and date or national-ID digit runs. No MRZ grammar
//! is parsed: false positives only add confidence and false negatives only
//! delay auto-capture.

use crate::config::MrzConfig;
use crate::errors::CaptureError;
use crate::flow::single_flight::{FlightGuard, SingleFlight};
use crate::platform::TextRecognizer;
use crate::types::{Frame, RecognitionSpeed, Rect};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref DATE_RUN: Regex = Regex::new(r"\b\d{6}\b").unwrap();
    static ref NATIONAL_ID_RUN: Regex = Regex::new(r"\b\d{11}\b").unwrap();
}

/// Lines at least this long look like MRZ rows; logged only.
const LONG_LINE: usize = 18;

/// Evidence extracted from recognised text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MrzSignals {
    pub chevrons: usize,
    pub long_lines: usize,
    pub country_code: bool,
    pub date_run: bool,
    pub national_id_run: bool,
    pub mrz_like: bool,
}

/// Number of `<` filler characters.
pub fn count_chevrons<S: AsRef<str>>(lines: &[S]) -> usize {
    lines
        .iter()
        .map(|l| l.as_ref().chars().filter(|&c| c == '<').count())
        .sum()
}

/// Classify recognised lines as MRZ-like or not.
pub fn classify<S: AsRef<str>>(lines: &[S], config: &MrzConfig) -> MrzSignals {
    let joined = lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join(" ");
    let upper = joined.to_uppercase();

    let chevrons = count_chevrons(lines);
    let long_lines = lines
        .iter()
        .filter(|l| l.as_ref().chars().count() >= LONG_LINE)
        .count();
    let country_code = config
        .country_codes
        .iter()
        .any(|code| upper.contains(&code.to_uppercase()));
    let date_run = DATE_RUN.is_match(&joined);
    let national_id_run = NATIONAL_ID_RUN.is_match(&joined);

    let mrz_like = chevrons >= config.chevrons_strong
        || (chevrons >= config.chevrons_weak && country_code && date_run)
        || (national_id_run && date_run);

    MrzSignals {
        chevrons,
        long_lines,
        country_code,
        date_run,
        national_id_run,
        mrz_like,
    }
}

/// Lower `fraction` of `roi`, inset 5 % on each side horizontally.
pub fn lower_band(roi: Rect, fraction: f32) -> Rect {
    let height = roi.height * fraction;
    Rect::new(
        roi.x + roi.width * 0.05,
        roi.max_y() - height,
        roi.width * 0.90,
        height,
    )
}

/// Upper `fraction` of `roi` with the same horizontal inset.
pub fn upper_band(roi: Rect, fraction: f32) -> Rect {
    Rect::new(
        roi.x + roi.width * 0.05,
        roi.y,
        roi.width * 0.90,
        roi.height * fraction,
    )
}

/// Single-flight MRZ probe. Clones share the same gate.
#[derive(Debug, Clone)]
pub struct MrzProbe {
    config: MrzConfig,
    flight: SingleFlight,
}

impl MrzProbe {
    pub fn new(config: MrzConfig) -> Self {
        Self {
            config,
            flight: SingleFlight::new("mrz-probe"),
        }
    }

    /// Claim the probe; `None` while another probe is outstanding.
    pub fn try_begin(&self) -> Option<FlightGuard> {
        self.flight.try_begin()
    }

    pub fn in_flight(&self) -> bool {
        self.flight.is_busy()
    }

    /// Recognise the MRZ band of `roi` and classify it.
    pub fn run(
        &self,
        frame: &Frame,
        roi: Rect,
        recognizer: &dyn TextRecognizer,
    ) -> Result<MrzSignals, CaptureError> {
        let band = lower_band(roi, self.config.band_fraction).clamp_to(frame.width, frame.height);
        if band.is_degenerate() {
            return Ok(MrzSignals::default());
        }
        let lines = recognizer.recognize(frame, band, RecognitionSpeed::Fast)?;
        let signals = classify(&lines, &self.config);
        log::debug!(
            "MRZ probe: chevrons={} long_lines={} country={} date={} id11={} mrz_like={}",
            signals.chevrons,
            signals.long_lines,
            signals.country_code,
            signals.date_run,
            signals.national_id_run,
            signals.mrz_like
        );
        Ok(signals)
    }
}
