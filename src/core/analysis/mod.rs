//! Detection algorithms
//!
//! Contains the individual analyzers, each a pure function over an
//! immutable view of the input:
//! - Metadata inspection (oversized or non-printable tags, structural anomalies)
//! - LSB pairs analysis (sliding-window close-pair ratios)
//! - Pairs-of-values chi-square test
//! - RS (regular/singular) steganalysis with payload estimate
//! - Phase-coding discontinuities in audio
//! - Echo-hiding autocorrelation peaks
//! - File carving past the host's end-of-data

pub mod carving;
mod chi_square;
mod echo_hiding;
mod lsb_pairs;
mod metadata;
mod phase_coding;
mod rs;

pub use carving::{scan as carve, CarvingScan};
pub use chi_square::{analyze as analyze_chi_square, PlaneChiSquare};
pub use echo_hiding::{analyze as analyze_echo_hiding, summarize as summarize_echoes, EchoSummary, WindowPeak};
pub use lsb_pairs::{analyze as analyze_lsb_pairs, PlaneLsbPairs};
pub use metadata::analyze as analyze_metadata;
pub use phase_coding::{analyze as analyze_phase_coding, ChannelPhase};
pub use rs::{analyze as analyze_rs, estimate_rate, PlaneRs, RsCounts};
