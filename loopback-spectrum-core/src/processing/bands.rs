//! Frequency band table and FFT bin-to-band assignment.

/// Number of bands in the default table.
pub const DEFAULT_BAND_COUNT: usize = 9;

/// Upper edge of the lowest default band, in Hz.
pub const DEFAULT_LOWEST_EDGE: u32 = 30;

/// Default band edges: a doubling progression from 30 Hz.
pub fn default_band_edges() -> Vec<u32> {
    (0..DEFAULT_BAND_COUNT)
        .map(|band| DEFAULT_LOWEST_EDGE << band)
        .collect()
}

/// Centre frequency of an FFT bin, truncated to whole Hz.
pub fn bin_frequency(bin: usize, sample_rate: u32, fft_len: usize) -> u64 {
    bin as u64 * sample_rate as u64 / fft_len as u64
}

/// Frequency above which a bin no longer belongs to `band`: halfway to the
/// next edge, or half again above the last edge.
fn band_threshold(edges: &[u32], band: usize) -> u64 {
    let edge = edges[band] as u64;
    match edges.get(band + 1) {
        Some(&next) => (edge + next as u64) / 2,
        None => edge + edge / 2,
    }
}

/// Walks bins `0..=fft_len / 2` in order, calling `visit(bin, band)` for
/// every bin owned by a band.
///
/// A bin stays in the current band while the next bin's frequency does not
/// exceed the band threshold; otherwise the walk advances one band. Bins
/// left over once the last band is passed are not visited.
pub fn walk_bins(edges: &[u32], sample_rate: u32, fft_len: usize, mut visit: impl FnMut(usize, usize)) {
    if fft_len == 0 || edges.is_empty() {
        return;
    }
    let mut band = 0;
    for bin in 0..=fft_len / 2 {
        visit(bin, band);
        if bin_frequency(bin + 1, sample_rate, fft_len) > band_threshold(edges, band) {
            band += 1;
            if band == edges.len() {
                break;
            }
        }
    }
}

/// Owning band of every bin in `0..=fft_len / 2`, `None` for dropped bins.
pub fn bin_band_assignment(edges: &[u32], sample_rate: u32, fft_len: usize) -> Vec<Option<usize>> {
    let mut owners = vec![None; fft_len / 2 + 1];
    walk_bins(edges, sample_rate, fft_len, |bin, band| owners[bin] = Some(band));
    owners
}

/// Band edges with a parallel vector of smoothed magnitudes.
///
/// Both vectors always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyBandTable {
    edges: Vec<u32>,
    outputs: Vec<f32>,
}

impl FrequencyBandTable {
    pub fn new(edges: Vec<u32>) -> Self {
        let outputs = vec![0.0; edges.len()];
        Self { edges, outputs }
    }

    pub fn edges(&self) -> &[u32] {
        &self.edges
    }

    pub fn outputs(&self) -> &[f32] {
        &self.outputs
    }

    pub(crate) fn outputs_mut(&mut self) -> &mut [f32] {
        &mut self.outputs
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Replaces the edges. Outputs of retained bands keep their values;
    /// added bands start at zero.
    pub fn set_edges(&mut self, edges: Vec<u32>) {
        self.outputs.resize(edges.len(), 0.0);
        self.edges = edges;
    }
}

impl Default for FrequencyBandTable {
    fn default() -> Self {
        Self::new(default_band_edges())
    }
}
