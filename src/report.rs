use std::fmt::Write;

use crate::config::AnalysisConfig;
use crate::evidence::FactorEvidence;
use crate::models::DipKind;
use crate::pipeline::{Summary, Timeseries};

pub fn build_report(
    summary: &Summary,
    timeseries: &Timeseries,
    dip_evidence: &[FactorEvidence],
    config: &AnalysisConfig,
) -> String {
    let mut output = String::new();
    let meta = &summary.meta;

    let _ = writeln!(output, "# Recovery Attribution Report");
    match (meta.window_start, meta.window_end) {
        (Some(start), Some(end)) => {
            let _ = writeln!(
                output,
                "Generated for {} over {} days ({} to {})",
                summary.user_id, summary.days_window, start, end
            );
        }
        _ => {
            let _ = writeln!(output, "Generated for {} (no records)", summary.user_id);
        }
    }

    if summary.days_window < config.display_min_days {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "> Insufficient data: only {} of the recommended {} days are available. \
             Results below may be unreliable.",
            summary.days_window, config.display_min_days
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recovery");
    let _ = writeln!(
        output,
        "- mean {:.1}, std {:.2} across {} measured days",
        meta.stability.recovery_mean, meta.stability.recovery_std, meta.stability.recovery_samples
    );
    let _ = writeln!(
        output,
        "- {} dips ({} large, {} persistent)",
        meta.dip_count, meta.large_dip_count, meta.persistent_dip_count
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Factor Attribution");

    if summary.factors.is_empty() {
        let _ = writeln!(output, "No factor was abnormal on any dip day in this window.");
    } else {
        for factor in summary.factors.iter() {
            let marker = if summary.dominant_key == Some(factor.key) {
                " (dominant)"
            } else {
                ""
            };
            let noisy = if factor.noise_ratio > config.max_noise_ratio {
                ", noisy"
            } else {
                ""
            };
            let _ = writeln!(
                output,
                "- {}{}: {:.0}% of dips, {} occurrences, avg |z| {:.2}, weighted {:.2}, \
                 {:.0}% of abnormal days outside dips{}, {} consistent window{}",
                factor.key,
                marker,
                factor.percent_of_dips,
                factor.occurrences,
                factor.avg_abs_z,
                factor.weighted_score,
                factor.noise_ratio * 100.0,
                noisy,
                factor.consistent_windows,
                if factor.consistent_windows == 1 { "" } else { "s" },
            );
        }
    }
    if !meta.pareto.consistent_factors.is_empty() {
        let keys: Vec<&str> = meta.pareto.consistent_factors.iter().map(|k| k.as_str()).collect();
        let _ = writeln!(
            output,
            "Recurring across {}-day windows: {}",
            meta.pareto.baseline_days_window,
            keys.join(", ")
        );
    }
    let _ = writeln!(
        output,
        "Abnormal at |z| >= {:.2}, lag search up to {} days.",
        meta.pareto.abnormal_abs_z, meta.pareto.max_lag_days
    );

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Insight (signal strength: {})",
        summary.insight.signal_strength.as_str()
    );
    let _ = writeln!(output, "**{}**", summary.insight.title);
    let _ = writeln!(output);
    let _ = writeln!(output, "{}", summary.insight.body);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Dip Days");

    let dips: Vec<_> = timeseries.days.iter().filter(|d| d.is_dip).collect();
    if dips.is_empty() {
        let _ = writeln!(output, "No recovery dips in this window.");
    } else {
        for day in dips {
            let attributed: Vec<String> = dip_evidence
                .iter()
                .filter(|ev| ev.date == day.date && ev.is_abnormal)
                .map(|ev| match ev.lag_days {
                    0 => format!("{} (|z| {:.2})", ev.factor_key, ev.abs_z),
                    lag => format!("{} (|z| {:.2}, {} day lag)", ev.factor_key, ev.abs_z, lag),
                })
                .collect();
            let kind = match day.dip_kind {
                DipKind::Large => "large",
                _ => "persistent",
            };
            let recovery = day
                .recovery_value
                .map(|v| format!("{v:.1}"))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = writeln!(
                output,
                "- {} {} dip, recovery {}: {}",
                day.date,
                kind,
                recovery,
                if attributed.is_empty() {
                    "no abnormal factor".to_string()
                } else {
                    attributed.join(", ")
                }
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyRecord;
    use crate::pipeline::{compute_dip_evidence, compute_summary, compute_timeseries};
    use chrono::{Duration, NaiveDate};

    fn records(n: usize, dip_at: Option<usize>) -> Vec<DailyRecord> {
        let start = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        (0..n)
            .map(|i| {
                let blip = if i % 5 == 4 { 1.0 } else { 0.0 };
                let dipped = dip_at == Some(i);
                DailyRecord {
                    recovery_value: Some(if dipped { 55.0 } else { 70.0 + blip }),
                    sleep_duration: Some(8.0),
                    exercise_value: Some(if dipped { 600.0 } else { 300.0 + 10.0 * blip }),
                    nutrition_value: Some(2100.0),
                    ..DailyRecord::new(start + Duration::days(i as i64))
                }
            })
            .collect()
    }

    fn render(records: &[DailyRecord], window: i64) -> String {
        let config = AnalysisConfig::default();
        let summary = compute_summary("ana", records, window, &config).unwrap();
        let timeseries = compute_timeseries("ana", records, window, &config).unwrap();
        let evidence = compute_dip_evidence(records, window, &config).unwrap();
        build_report(&summary, &timeseries, &evidence, &config)
    }

    #[test]
    fn report_lists_dips_with_attributed_factors() {
        let report = render(&records(35, Some(30)), 35);
        assert!(report.starts_with("# Recovery Attribution Report"));
        assert!(report.contains("- 1 dips (1 large, 0 persistent)"));
        assert!(report.contains("- exercise (dominant): 100% of dips"));
        assert!(report.contains("1 consistent window"));
        assert!(!report.contains("Recurring across"));
        assert!(report.contains("2026-05-31 large dip, recovery 55.0: exercise"));
        assert!(!report.contains("Insufficient data"));
    }

    #[test]
    fn short_window_carries_notice() {
        let report = render(&records(12, None), 12);
        assert!(report.contains("Insufficient data: only 12 of the recommended 30 days"));
        assert!(report.contains("No recovery dips in this window."));
    }
}
