//! Scale-aware binning of continuous filter values.
//!
//! A scale maps a data domain onto a pixel range through a forward transform
//! `f`. Binning replays that mapping and floors it, so every value lands in
//! the same integer bucket the front-end would draw it in:
//!
//! ```text
//! lo  = f(min(d0, d1))      hi = f(max(d0, d1))
//! a   = |r1 - r0| / (hi - lo) / pixel_size
//! bin = pixel_size * floor(a * (f(v) - lo))
//! ```

use crate::selection::Scale;
use crate::sql::{BinaryOp, Expr};

/// Forward transform of a supported scale kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScaleTransform {
    Linear,
    /// Natural logarithm.
    Log,
    /// `sign(v) * ln(1 + |v|)`, defined through zero.
    Symlog,
    Sqrt,
    /// Epoch milliseconds.
    Temporal,
}

impl ScaleTransform {
    /// Transform for a scale kind name; `None` for unsupported kinds.
    pub fn for_kind(kind: &str) -> Option<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "linear" => Some(Self::Linear),
            "log" => Some(Self::Log),
            "symlog" => Some(Self::Symlog),
            "sqrt" => Some(Self::Sqrt),
            "time" | "utc" | "temporal" => Some(Self::Temporal),
            _ => None,
        }
    }

    /// Whether `apply` and `apply_sql` agree bit for bit. Arithmetic and
    /// `sqrt` are correctly rounded everywhere; `ln` depends on the libm on
    /// each side and may differ by an ulp.
    pub fn is_exact(self) -> bool {
        matches!(self, Self::Linear | Self::Sqrt | Self::Temporal)
    }

    pub fn apply(self, v: f64) -> f64 {
        match self {
            Self::Linear | Self::Temporal => v,
            Self::Log => v.ln(),
            Self::Symlog => {
                if v == 0.0 {
                    0.0
                } else {
                    v.signum() * v.abs().ln_1p()
                }
            }
            Self::Sqrt => v.sqrt(),
        }
    }

    /// The same transform as a SQL expression over `value`.
    pub fn apply_sql(self, value: Expr) -> Expr {
        match self {
            Self::Linear => value,
            Self::Log => Expr::function("LN", vec![value]),
            Self::Symlog => Expr::binary(
                BinaryOp::Mul,
                Expr::function("SIGN", vec![value.clone()]),
                Expr::function(
                    "LN",
                    vec![Expr::binary(
                        BinaryOp::Add,
                        Expr::int(1),
                        Expr::function("ABS", vec![value]),
                    )],
                ),
            ),
            Self::Sqrt => Expr::function("SQRT", vec![value]),
            Self::Temporal => Expr::function("epoch_ms", vec![value]),
        }
    }
}

/// A deterministic value → bin mapping derived from one scale.
#[derive(Clone, Debug, PartialEq)]
pub struct Binner {
    transform: ScaleTransform,
    lo: f64,
    scale: f64,
    pixel_size: u32,
}

/// Derive the binning function for `scale` at one pixel per bin.
pub fn bin(scale: &Scale) -> Option<Binner> {
    Binner::new(scale, 1)
}

impl Binner {
    /// `None` for unsupported scale kinds, a zero pixel size, or a domain
    /// that collapses (or leaves the transform's support) under `f`.
    pub fn new(scale: &Scale, pixel_size: u32) -> Option<Self> {
        let transform = ScaleTransform::for_kind(&scale.kind)?;
        if pixel_size == 0 {
            return None;
        }
        let [d0, d1] = scale.domain;
        let lo = transform.apply(d0.min(d1));
        let hi = transform.apply(d0.max(d1));
        let span = hi - lo;
        if !lo.is_finite() || !hi.is_finite() || span <= 0.0 {
            return None;
        }
        let extent = (scale.range[1] - scale.range[0]).abs();
        let a = extent / span / f64::from(pixel_size);
        if !a.is_finite() {
            return None;
        }
        Some(Self {
            transform,
            lo,
            scale: a,
            pixel_size,
        })
    }

    pub fn transform(&self) -> ScaleTransform {
        self.transform
    }

    /// Bin index of a concrete value, `None` if the value falls outside the
    /// transform's support (e.g. `log` of a negative number).
    pub fn bin(&self, v: f64) -> Option<i64> {
        let x = (self.scale * (self.transform.apply(v) - self.lo)).floor();
        if !x.is_finite() {
            return None;
        }
        Some(i64::from(self.pixel_size) * x as i64)
    }

    /// SQL computing the bin of `value`.
    pub fn bin_sql(&self, value: Expr) -> Expr {
        let offset = Expr::binary(
            BinaryOp::Sub,
            self.transform.apply_sql(value),
            Expr::float(self.lo).cast("DOUBLE"),
        );
        let scaled = Expr::binary(
            BinaryOp::Mul,
            Expr::float(self.scale).cast("DOUBLE"),
            offset,
        );
        let binned = Expr::function("FLOOR", vec![scaled]).cast("INTEGER");
        if self.pixel_size == 1 {
            binned
        } else {
            Expr::binary(
                BinaryOp::Mul,
                Expr::int(i64::from(self.pixel_size)).cast("INTEGER"),
                binned,
            )
        }
    }

    /// Bin of an arbitrary expression. Literals are folded to an integer when
    /// the transform is exact; anything else is binned in SQL, with the same
    /// functions that computed the materialized bin column, so a value on a
    /// bin edge cannot land in a neighbouring bin.
    pub fn bin_expr(&self, value: &Expr) -> Expr {
        if !self.transform.is_exact() {
            return self.bin_sql(value.clone());
        }
        match value.as_f64().and_then(|v| self.bin(v)) {
            Some(b) => Expr::int(b),
            None => self.bin_sql(value.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn binner(kind: &str, domain: [f64; 2], range: [f64; 2]) -> Binner {
        bin(&Scale::new(kind, domain, range)).expect("supported scale")
    }

    #[test]
    fn linear_bins_match_pixel_buckets() {
        let b = binner("linear", [0.0, 100.0], [0.0, 10.0]);
        assert_eq!(b.bin(0.0), Some(0));
        assert_eq!(b.bin(20.0), Some(2));
        assert_eq!(b.bin(40.0), Some(4));
        assert_eq!(b.bin(99.9), Some(9));
        assert_eq!(b.bin(100.0), Some(10));
    }

    #[test]
    fn reversed_domain_and_range_bin_the_same() {
        let b = binner("linear", [100.0, 0.0], [10.0, 0.0]);
        assert_eq!(b.bin(0.0), Some(0));
        assert_eq!(b.bin(100.0), Some(10));
    }

    #[test]
    fn domain_ends_map_to_range_extent() {
        let cases = [
            ("log", [1.0, 1000.0], [0.0, 300.0], 300),
            ("symlog", [-100.0, 100.0], [0.0, 200.0], 200),
            ("sqrt", [0.0, 100.0], [0.0, 50.0], 50),
            ("time", [0.0, 86_400_000.0], [0.0, 24.0], 24),
            ("utc", [0.0, 86_400_000.0], [0.0, 24.0], 24),
        ];
        for (kind, domain, range, extent) in cases {
            let b = binner(kind, domain, range);
            assert_eq!(b.bin(domain[0]), Some(0), "{kind} min");
            assert_eq!(b.bin(domain[1]), Some(extent), "{kind} max");
        }
    }

    #[test]
    fn log_bins_follow_logarithm() {
        let b = binner("log", [1.0, 1000.0], [0.0, 300.0]);
        assert_eq!(b.bin(3.0), Some(47));
        assert_eq!(b.bin(20.0), Some(130));
        assert_eq!(b.bin(500.0), Some(269));
        assert_eq!(b.bin(-1.0), None);
    }

    #[test]
    fn symlog_transform_is_odd_and_zero_at_origin() {
        let t = ScaleTransform::Symlog;
        assert_eq!(t.apply(0.0), 0.0);
        for v in [0.5, 1.0, 7.0, 1e6] {
            assert_eq!(t.apply(-v), -t.apply(v));
        }
        let b = binner("symlog", [-100.0, 100.0], [0.0, 200.0]);
        assert_eq!(b.bin(0.0), Some(100));
        assert_eq!(b.bin(-1.0), Some(84));
        assert_eq!(b.bin(1.0), Some(115));
    }

    #[test]
    fn unsupported_or_degenerate_scales_fail_closed() {
        assert!(bin(&Scale::new("pow", [0.0, 1.0], [0.0, 1.0])).is_none());
        assert!(bin(&Scale::new("ordinal", [0.0, 1.0], [0.0, 1.0])).is_none());
        assert!(bin(&Scale::new("linear", [5.0, 5.0], [0.0, 1.0])).is_none());
        assert!(bin(&Scale::new("log", [0.0, 10.0], [0.0, 1.0])).is_none());
        assert!(Binner::new(&Scale::new("linear", [0.0, 1.0], [0.0, 1.0]), 0).is_none());
    }

    #[test]
    fn pixel_size_coarsens_bins() {
        let b = Binner::new(&Scale::new("linear", [0.0, 100.0], [0.0, 10.0]), 2).unwrap();
        assert_eq!(b.bin(0.0), Some(0));
        assert_eq!(b.bin(20.0), Some(2));
        assert_eq!(b.bin(30.0), Some(2));
        assert_eq!(b.bin(40.0), Some(4));
        assert!(b.bin_sql(Expr::column("x")).to_string().starts_with("2::INTEGER * FLOOR("));
    }

    #[test]
    fn sql_binning_renders_transform() {
        let lin = binner("linear", [0.0, 100.0], [0.0, 10.0]);
        assert_eq!(
            lin.bin_sql(Expr::column("date")).to_string(),
            "FLOOR(0.1::DOUBLE * (\"date\" - 0::DOUBLE))::INTEGER"
        );
        let log = binner("log", [1.0, 1000.0], [0.0, 300.0]);
        assert!(log.bin_sql(Expr::column("v")).to_string().contains("LN(\"v\")"));
        let sym = binner("symlog", [-1.0, 1.0], [0.0, 10.0]);
        assert!(
            sym.bin_sql(Expr::column("v"))
                .to_string()
                .contains("SIGN(\"v\") * LN(1 + ABS(\"v\"))")
        );
        let time = binner("time", [0.0, 1000.0], [0.0, 10.0]);
        assert!(time.bin_sql(Expr::column("t")).to_string().contains("epoch_ms(\"t\")"));
    }

    #[test]
    fn bin_expr_folds_literals_only() {
        let b = binner("linear", [0.0, 100.0], [0.0, 10.0]);
        assert_eq!(b.bin_expr(&Expr::int(40)), Expr::int(4));
        assert_eq!(b.bin_expr(&Expr::float(20.0)), Expr::int(2));
        assert!(matches!(b.bin_expr(&Expr::column("lo")), Expr::Cast { .. }));

        let sqrt = binner("sqrt", [0.0, 100.0], [0.0, 50.0]);
        assert_eq!(sqrt.bin_expr(&Expr::int(25)), Expr::int(25));
    }

    #[test]
    fn log_bounds_are_binned_in_sql() {
        let log = binner("log", [1.0, 1000.0], [0.0, 300.0]);
        let binned = log.bin_expr(&Expr::int(20));
        assert!(matches!(binned, Expr::Cast { .. }));
        assert!(binned.to_string().contains("LN(20)"));

        let sym = binner("symlog", [-100.0, 100.0], [0.0, 200.0]);
        assert!(sym.bin_expr(&Expr::int(1)).to_string().contains("SIGN(1) * LN(1 + ABS(1))"));
    }
}
