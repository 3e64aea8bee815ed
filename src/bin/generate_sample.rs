//! Writes synthetic `anzahl_photos.csv` and `anzahl_felder.csv` (plus
//! Parquet copies) with the column layout the built-in plan expects.
//!
//! Usage: `generate_sample [OUT_DIR]`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

const LISTINGS: usize = 1500;
/// Every n-th row gets an unparseable predictor.
const MISSING_EVERY: usize = 97;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    /// Marsaglia-Tsang, valid for `shape >= 1`.
    fn gamma(&mut self, shape: f64, scale: f64) -> f64 {
        let d = shape - 1.0 / 3.0;
        let c = 1.0 / (9.0 * d).sqrt();
        loop {
            let z = self.gauss(0.0, 1.0);
            let v = (1.0 + c * z).powi(3);
            if v <= 0.0 {
                continue;
            }
            let u = self.next_f64().max(1e-15);
            if u.ln() < 0.5 * z * z + d - d * v + d * v.ln() {
                return d * v * scale;
            }
        }
    }

    /// Knuth for small means, rounded normal approximation above 30.
    fn poisson(&mut self, lambda: f64) -> i64 {
        if lambda > 30.0 {
            return self.gauss(lambda, lambda.sqrt()).round().max(0.0) as i64;
        }
        let limit = (-lambda).exp();
        let mut k = 0;
        let mut p = self.next_f64();
        while p > limit {
            k += 1;
            p *= self.next_f64();
        }
        k
    }

    /// NB2 draw with mean `mu` and dispersion `alpha` as a gamma-Poisson mixture.
    fn neg_binomial(&mut self, mu: f64, alpha: f64) -> i64 {
        let rate = self.gamma(1.0 / alpha, mu * alpha);
        self.poisson(rate)
    }

    fn bernoulli(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// One synthetic listing table: predictor plus outcome columns.
struct Listings {
    predictor_name: &'static str,
    visits_name: &'static str,
    /// `None` marks an unparseable predictor cell ("n/a").
    predictor: Vec<Option<i64>>,
    sold: Vec<bool>,
    visits: Vec<i64>,
    bidders: Vec<i64>,
    bids: Vec<i64>,
}

impl Listings {
    fn generate(
        rng: &mut SimpleRng,
        predictor_name: &'static str,
        visits_name: &'static str,
        predictor_max: i64,
        effect: f64,
    ) -> Self {
        let mut t = Listings {
            predictor_name,
            visits_name,
            predictor: Vec::with_capacity(LISTINGS),
            sold: Vec::with_capacity(LISTINGS),
            visits: Vec::with_capacity(LISTINGS),
            bidders: Vec::with_capacity(LISTINGS),
            bids: Vec::with_capacity(LISTINGS),
        };
        for i in 0..LISTINGS {
            // skewed towards few photos/fields, like real listings
            let u = rng.next_f64();
            let x = (u * u * predictor_max as f64).round() as i64;
            let xf = x as f64;

            let p_sale = 1.0 / (1.0 + (-(-1.2 + effect * 2.0 * xf)).exp());
            t.sold.push(rng.bernoulli(p_sale));
            t.visits.push(rng.neg_binomial((3.5 + effect * xf).exp(), 0.6));
            t.bidders.push(rng.neg_binomial((0.4 + effect * 0.8 * xf).exp(), 0.5));
            t.bids.push(rng.neg_binomial((1.0 + effect * xf).exp(), 0.9));
            t.predictor.push((i % MISSING_EVERY != MISSING_EVERY - 1).then_some(x));
        }
        t
    }

    fn headers(&self) -> [&'static str; 5] {
        [
            self.predictor_name,
            "Verkauf",
            self.visits_name,
            "Anzahl Bidder",
            "Anzahl Gebote",
        ]
    }

    fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        writer.write_record(self.headers())?;
        for i in 0..self.sold.len() {
            let predictor = self.predictor[i].map_or_else(|| "n/a".to_string(), |x| x.to_string());
            writer.write_record([
                predictor,
                sale_label(self.sold[i]).to_string(),
                self.visits[i].to_string(),
                self.bidders[i].to_string(),
                self.bids[i].to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_parquet(&self, path: &Path) -> Result<()> {
        let [p, s, v, bd, bs] = self.headers();
        let schema = Arc::new(Schema::new(vec![
            Field::new(p, DataType::Int64, true),
            Field::new(s, DataType::Utf8, false),
            Field::new(v, DataType::Int64, false),
            Field::new(bd, DataType::Int64, false),
            Field::new(bs, DataType::Int64, false),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(self.predictor.clone())),
            Arc::new(StringArray::from(
                self.sold.iter().map(|&b| sale_label(b)).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(self.visits.clone())),
            Arc::new(Int64Array::from(self.bidders.clone())),
            Arc::new(Int64Array::from(self.bids.clone())),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns)
            .context("building record batch")?;

        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

fn sale_label(sold: bool) -> &'static str {
    if sold { "ja" } else { "nein" }
}

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let tables = [
        (
            "anzahl_photos",
            Listings::generate(&mut rng, "Anzahl Photos", "Besuche", 150, 0.015),
        ),
        (
            "anzahl_felder",
            Listings::generate(&mut rng, "Anzahl befüllter Felder", "Besucher", 40, 0.03),
        ),
    ];

    for (stem, table) in &tables {
        let csv_path = out_dir.join(format!("{stem}.csv"));
        let parquet_path = out_dir.join(format!("{stem}.parquet"));
        table.write_csv(&csv_path)?;
        table.write_parquet(&parquet_path)?;
        println!(
            "Wrote {} listings to {} and {}",
            table.sold.len(),
            csv_path.display(),
            parquet_path.display()
        );
    }
    Ok(())
}
