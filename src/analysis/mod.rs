//! Signal extraction: the rolling intensity window and the temporal and
//! spatial band-centroid estimators.

mod buffer;
mod spatial;
mod spectrum;
mod temporal;

pub use buffer::{IntensityBuffer, DEFAULT_BUFFER_CAPACITY};
pub use spatial::{band_in_cycles_per_pixel, SpatialSpectrumEstimator};
pub use spectrum::{band_centroid, Band, BandCentroid, Domain, SpectralSummary, Spectrum};
pub use temporal::TemporalSpectrumEstimator;
