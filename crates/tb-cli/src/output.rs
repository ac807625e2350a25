//! Report artifacts: JSON table and CSV curve.

use anyhow::Result;
use std::path::Path;
use tb_inference::{LimitEstimate, LimitReport, RangeSide};

const BAND_LABELS: [&str; 5] = ["exp_p2", "exp_p1", "exp_median", "exp_m1", "exp_m2"];

pub fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn render_limit(estimate: &LimitEstimate) -> String {
    match estimate {
        LimitEstimate::Bracketed { value, .. } => format!("{:.6}", value),
        LimitEstimate::OutOfRange { side: RangeSide::Below } => "out_of_range_below".to_string(),
        LimitEstimate::OutOfRange { side: RangeSide::Above } => "out_of_range_above".to_string(),
    }
}

/// One row per scan point, then one row per limit.
///
/// Limit rows carry the interpolated value (or the out-of-range side) in the `poi`
/// column and leave the curve columns empty.
pub fn write_curve_csv(path: &Path, report: &LimitReport) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec!["row", "poi", "q_obs", "clsb", "clsb_err", "clb", "clb_err", "cls", "cls_err"];
    header.extend(BAND_LABELS);
    header.extend(["n_null", "n_alt"]);
    wtr.write_record(&header)?;

    for p in &report.points {
        let mut row = vec![
            "curve".to_string(),
            format!("{}", p.point),
            format!("{:.6}", p.observed),
            format!("{:.6e}", p.clsb),
            format!("{:.6e}", p.clsb_err),
            format!("{:.6e}", p.clb),
            format!("{:.6e}", p.clb_err),
            format!("{:.6e}", p.cls),
            format!("{:.6e}", p.cls_err),
        ];
        row.extend(p.expected.iter().map(|v| format!("{:.6e}", v)));
        row.push(p.n_null.to_string());
        row.push(p.n_alt.to_string());
        wtr.write_record(&row)?;
    }

    let blank = header.len() - 2;
    let mut limit_row = |label: &str, estimate: &LimitEstimate| -> Result<()> {
        let mut row = vec![label.to_string(), render_limit(estimate)];
        row.extend(std::iter::repeat_n(String::new(), blank));
        wtr.write_record(&row)?;
        Ok(())
    };
    limit_row("limit_observed", &report.observed)?;
    for (label, estimate) in BAND_LABELS.iter().zip(&report.expected) {
        limit_row(&format!("limit_{}", label), estimate)?;
    }
    wtr.flush()?;
    Ok(())
}

/// JSON document written next to the CSV curve.
pub fn report_json(report: &LimitReport) -> Result<serde_json::Value> {
    let expected: serde_json::Map<String, serde_json::Value> = BAND_LABELS
        .iter()
        .zip(&report.expected)
        .map(|(label, e)| Ok((label.to_string(), serde_json::to_value(e)?)))
        .collect::<Result<_>>()?;
    Ok(serde_json::json!({
        "channel": report.channel,
        "poi": report.poi,
        "confidence_level": report.confidence_level,
        "use_cls": report.use_cls,
        "observed_limit": report.observed,
        "observed_limit_error": report.observed_error,
        "expected_limits": expected,
        "clb_at_limit": report.clb_at_limit,
        "monotonic": report.monotonic,
        "discovery": report.discovery,
        "visible_cross_section": report.visible_cross_section,
        "points": report.points,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_limit() {
        let b = LimitEstimate::Bracketed { value: 1.25, lower_point: 1.0, upper_point: 2.0 };
        assert_eq!(render_limit(&b), "1.250000");
        let o = LimitEstimate::OutOfRange { side: RangeSide::Above };
        assert_eq!(render_limit(&o), "out_of_range_above");
    }
}
