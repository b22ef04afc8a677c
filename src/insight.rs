//! Template-driven insight text. The same analysis always yields the same
//! title and body.

use serde::Serialize;

use crate::models::{FactorKey, SignalStrength};
use crate::pareto::ParetoResult;
use crate::signal::{FactorState, Volatility};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub title: String,
    pub body: String,
    pub signal_strength: SignalStrength,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_factor: Option<FactorKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<FactorState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<Volatility>,
}

pub struct InsightContext<'a> {
    pub pareto: &'a ParetoResult,
    pub signal_strength: SignalStrength,
    pub sufficient_history: bool,
    pub state: FactorState,
    pub volatility: Volatility,
}

fn plain(title: &str, body: &str, signal_strength: SignalStrength) -> Insight {
    Insight {
        title: title.to_string(),
        body: body.to_string(),
        signal_strength,
        primary_factor: None,
        primary_percent: None,
        current_state: None,
        volatility: None,
    }
}

fn state_phrase(state: FactorState) -> Option<&'static str> {
    match state {
        FactorState::BelowNormal => Some("below your usual range"),
        FactorState::WithinNormal => Some("within your usual range"),
        FactorState::AboveNormal => Some("above your usual range"),
        FactorState::Unknown => None,
    }
}

pub fn compose(ctx: &InsightContext<'_>) -> Insight {
    let pareto = ctx.pareto;

    let Some(dominant) = pareto.dominant() else {
        if !ctx.sufficient_history && pareto.dip_count == 0 {
            return plain(
                "Not enough history yet",
                "There is not enough recovery history to evaluate factors in this window. \
                 More days of data will make the analysis meaningful.",
                ctx.signal_strength,
            );
        }
        if pareto.dip_count == 0 {
            return plain(
                "Recovery is stable",
                "Recovery stayed close to your own baseline across the selected window, \
                 so there are no recovery dips to attribute to a factor.",
                ctx.signal_strength,
            );
        }
        let body = format!(
            "{} recovery dip{} detected, but no single factor was abnormal on enough of them \
             to stand out. Dips may be driven by several small factors at once or by something \
             that is not tracked.",
            pareto.dip_count,
            if pareto.dip_count == 1 { " was" } else { "s were" },
        );
        return plain("No dominant recovery factor detected", &body, ctx.signal_strength);
    };

    let factor = dominant.key;
    let mut parts = vec![format!(
        "{} was abnormal on {:.0}% of recovery dips in this window ({} of {}).",
        factor.label(),
        dominant.percent_of_dips,
        dominant.occurrences,
        pareto.dip_count,
    )];

    if let Some(runner_up) = pareto.runner_up() {
        parts.push(format!(
            "Recovery dips line up more often with {} than with {} ({:.0}%).",
            factor, runner_up.key, runner_up.percent_of_dips,
        ));
    }

    if pareto.max_lag_days > 0 {
        parts.push(format!(
            "Readings up to {} day{} before each dip were considered.",
            pareto.max_lag_days,
            if pareto.max_lag_days == 1 { "" } else { "s" },
        ));
    }

    parts.push(match state_phrase(ctx.state) {
        Some(phrase) => format!("Your latest {factor} reading is {phrase}."),
        None => format!("There is not enough recent {factor} data to describe its current level."),
    });

    parts.push(match ctx.volatility {
        Volatility::Volatile => format!("{} has varied a lot over this window.", factor.label()),
        Volatility::Stable => format!("{} has been fairly consistent over this window.", factor.label()),
        Volatility::Unknown => format!("There is not enough {factor} data to judge its consistency."),
    });

    parts.push(
        "This is an association within your own history, not a cause; factors can interact."
            .to_string(),
    );

    Insight {
        title: format!("Primary dip-associated factor: {}", factor.label()),
        body: parts.join(" "),
        signal_strength: ctx.signal_strength,
        primary_factor: Some(factor),
        primary_percent: Some(dominant.percent_of_dips),
        current_state: Some(ctx.state),
        volatility: Some(ctx.volatility),
    }
}
