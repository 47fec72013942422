/// Per-feature standardization fitted on training rows only.
///
/// With `with_mean` disabled the data is only divided by the per-feature
/// standard deviation. Constant features keep a scale of 1.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    with_mean: bool,
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f32>], with_mean: bool) -> Self {
        let dim = rows.first().map_or(0, Vec::len);
        let n = rows.len().max(1) as f64;

        let mut sum = vec![0.0f64; dim];
        for row in rows {
            for (acc, &v) in sum.iter_mut().zip(row) {
                *acc += v as f64;
            }
        }
        let mean: Vec<f64> = sum.iter().map(|s| s / n).collect();

        let mut sq = vec![0.0f64; dim];
        for row in rows {
            for ((acc, &v), m) in sq.iter_mut().zip(row).zip(&mean) {
                let d = v as f64 - m;
                *acc += d * d;
            }
        }
        let scale = sq
            .iter()
            .map(|s| {
                let sd = (s / n).sqrt();
                if sd > f64::EPSILON { sd as f32 } else { 1.0 }
            })
            .collect();

        Self {
            with_mean,
            mean: mean.into_iter().map(|m| m as f32).collect(),
            scale,
        }
    }

    pub fn transform(&self, rows: &[Vec<f32>]) -> Vec<Vec<f32>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, &v)| {
                        let centered = if self.with_mean { v - self.mean[j] } else { v };
                        centered / self.scale[j]
                    })
                    .collect()
            })
            .collect()
    }
}
