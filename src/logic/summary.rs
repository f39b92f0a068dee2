use crate::models::{BreakEvenResult, ChartData, Roundable, Summary};

use super::constants::MONTHS_PER_YEAR;

pub fn summarize(result: &BreakEvenResult, processor_enabled: bool) -> Summary {
    let headline = match result.break_even_month {
        Some(month) => format!("Break-even is reached in month {month}."),
        None => format!(
            "Break-even is not reached within the first {} months.",
            result.horizon_months
        ),
    };

    let processor_fee_line = if processor_enabled {
        format!(
            "Payment processor fees per ticket: €{:.2}",
            result.processor_fee_per_ticket
        )
    } else {
        "Payment processor fees are disabled.".to_string()
    };

    Summary {
        break_even_reached: result.break_even_month.is_some(),
        headline,
        processor_fee_line,
        net_revenue_line: format!(
            "Net revenue per ticket after fees: €{:.2}",
            result.net_revenue_per_ticket
        ),
    }
}

/// 折线图数据：x 为月份，两条累计曲线，可选盈亏平衡标记
pub fn chart(result: &BreakEvenResult) -> ChartData {
    let years = result.horizon_months as usize / MONTHS_PER_YEAR;
    ChartData {
        title: format!("Break-even analysis over {years} years"),
        x_label: "Months".into(),
        y_label: "€".into(),
        months: (1..=result.horizon_months).collect(),
        cumulative_revenue: result.cumulative_revenue_series.iter().map(|v| v.round_2()).collect(),
        cumulative_cost: result.cumulative_cost_series.iter().map(|v| v.round_2()).collect(),
        break_even_marker: result.break_even_month,
    }
}
