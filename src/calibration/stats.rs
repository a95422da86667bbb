//! Summary statistics over raw cycle deltas

use serde::{Deserialize, Serialize};

/// Summary of a calibration sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Number of deltas
    pub count: usize,

    /// Arithmetic mean (cycles)
    pub mean: f64,

    /// Population standard deviation (cycles)
    pub std_dev: f64,

    /// Margin of error of the mean at the configured z score (cycles)
    pub margin: f64,

    /// Smallest delta
    pub min: u64,

    /// Largest delta
    pub max: u64,
}

impl SampleStats {
    /// Compute statistics over `deltas`
    ///
    /// `margin = z * std_dev / sqrt(count)`. An empty slice yields NaN mean,
    /// deviation and margin, which no confidence tier accepts.
    pub fn from_deltas(deltas: &[u64], z_score: f64) -> Self {
        let (mean, std_dev) = mean_and_std_dev(deltas);
        let count = deltas.len();

        Self {
            count,
            mean,
            std_dev,
            margin: z_score * std_dev / (count as f64).sqrt(),
            min: deltas.iter().copied().min().unwrap_or(0),
            max: deltas.iter().copied().max().unwrap_or(0),
        }
    }

    /// Margin as a fraction of the mean
    pub fn relative_margin(&self) -> f64 {
        if self.mean == 0.0 {
            if self.margin == 0.0 { 0.0 } else { f64::INFINITY }
        } else {
            self.margin / self.mean
        }
    }
}

fn mean_and_std_dev(deltas: &[u64]) -> (f64, f64) {
    use statrs::statistics::Statistics;

    let mean = deltas.iter().map(|&d| d as f64).mean();
    let std_dev = deltas.iter().map(|&d| d as f64).population_std_dev();
    (mean, std_dev)
}

impl std::fmt::Display for SampleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Calibration Statistics:")?;
        writeln!(f, "  Samples:   {}", self.count)?;
        writeln!(f, "  Mean:      {:.3} cycles", self.mean)?;
        writeln!(f, "  Std Dev:   {:.3} cycles", self.std_dev)?;
        writeln!(
            f,
            "  Margin:    {:.4} cycles ({:.4}%)",
            self.margin,
            self.relative_margin() * 100.0
        )?;
        writeln!(f, "  Minimum:   {} cycles", self.min)?;
        writeln!(f, "  Maximum:   {} cycles", self.max)?;
        Ok(())
    }
}
