pub mod fees;
pub mod presets;
pub mod schedule;
pub mod summary;

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::models::{AppConfig, BreakEvenRequest, BreakEvenResponse, BreakEvenResult, Parameters};

pub use self::fees::FeeSchedule;

// =========================================================================
// 1. 常量
// =========================================================================

pub(crate) mod constants {
    pub const MONTHS_PER_YEAR: usize = 12;
    pub const FIRST_HALF_MONTHS: usize = 6;
}

// =========================================================================
// 2. 盈亏平衡计算器
// =========================================================================

/// 单次计算为纯函数：同参同果，无副作用
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakEvenCalculator {
    fees: FeeSchedule,
    max_horizon_years: u32,
    enforce_preset_bounds: bool,
}

impl Default for BreakEvenCalculator {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl BreakEvenCalculator {
    pub fn new(fees: FeeSchedule, max_horizon_years: u32) -> Self {
        Self { fees, max_horizon_years, enforce_preset_bounds: false }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            fees: FeeSchedule::from_config(config),
            max_horizon_years: config.max_horizon_years.max(1),
            enforce_preset_bounds: config.enforce_preset_bounds,
        }
    }

    pub fn compute(&self, params: &Parameters, horizon_years: u32) -> EngineResult<BreakEvenResult> {
        self.check(params, horizon_years)?;

        let horizon_months = horizon_years as usize * constants::MONTHS_PER_YEAR;
        let processor_fee_per_ticket =
            self.fees.processor_fee(params.ticket_price, params.payment_processor_enabled);
        let net_revenue_per_ticket = self.fees.net_revenue_per_ticket(params);
        let development_cost = params.dev_hours * params.hourly_wage;

        let monthly_cost_series = schedule::monthly_cost_series(params, horizon_months);
        let monthly_ticket_volume_series =
            schedule::ticket_volume_series(&params.tickets_per_month_by_year, horizon_months);
        let cumulative_revenue_series =
            schedule::cumulative_revenue_series(&monthly_ticket_volume_series, net_revenue_per_ticket);
        let cumulative_cost_series =
            schedule::cumulative_cost_series(development_cost, &monthly_cost_series);

        // 有限输入的乘积仍可能溢出；inf >= inf 会误报第 1 月平衡
        if !all_finite(&monthly_cost_series) || !all_finite(&cumulative_cost_series) {
            return Err(EngineError::invalid(
                cost_overflow_field(params, horizon_months),
                "derived cost exceeds the representable range",
            ));
        }
        if !net_revenue_per_ticket.is_finite() || !all_finite(&cumulative_revenue_series) {
            return Err(EngineError::invalid(
                revenue_overflow_field(params),
                "derived revenue exceeds the representable range",
            ));
        }

        let break_even_month =
            schedule::first_crossing(&cumulative_revenue_series, &cumulative_cost_series);

        debug!(
            horizon_months,
            net_revenue_per_ticket,
            ?break_even_month,
            "break-even computed"
        );

        Ok(BreakEvenResult {
            horizon_months: horizon_months as u32,
            net_revenue_per_ticket,
            processor_fee_per_ticket,
            development_cost,
            monthly_cost_series,
            monthly_ticket_volume_series,
            cumulative_revenue_series,
            cumulative_cost_series,
            break_even_month,
        })
    }

    /// 计算 + 文本摘要 + 图表数据
    pub fn evaluate(&self, request: &BreakEvenRequest) -> EngineResult<BreakEvenResponse> {
        let result = self.compute(&request.parameters, request.resolved_horizon())?;
        let summary = summary::summarize(&result, request.parameters.payment_processor_enabled);
        let chart = summary::chart(&result);
        Ok(BreakEvenResponse { result, summary, chart })
    }

    fn check(&self, params: &Parameters, horizon_years: u32) -> EngineResult<()> {
        if horizon_years == 0 || horizon_years > self.max_horizon_years {
            return Err(EngineError::invalid(
                "horizon_years",
                format!("must be within [1, {}]", self.max_horizon_years),
            ));
        }

        params.check()?;

        let years = params.tickets_per_month_by_year.len();
        if years != horizon_years as usize {
            return Err(EngineError::invalid(
                "tickets_per_month_by_year",
                format!("expected {horizon_years} yearly entries, got {years}"),
            ));
        }

        if self.enforce_preset_bounds {
            presets::check_bounds(params)?;
        }
        Ok(())
    }
}

fn all_finite(series: &[f64]) -> bool {
    series.iter().all(|v| v.is_finite())
}

/// 溢出归因：时薪与贡献最大的工时项中量级较大者
fn cost_overflow_field(params: &Parameters, horizon_months: usize) -> &'static str {
    let months = horizon_months as f64;
    let half = constants::FIRST_HALF_MONTHS as f64;
    let after_year1 = (horizon_months.saturating_sub(constants::MONTHS_PER_YEAR)) as f64;
    let hours = [
        ("dev_hours", params.dev_hours),
        ("maintenance_hours_h1", params.maintenance_hours_h1 * half),
        ("maintenance_hours_h2", params.maintenance_hours_h2 * half),
        ("maintenance_hours_from_year2", params.maintenance_hours_from_year2 * after_year1),
        ("sales_hours_per_month", params.sales_hours_per_month * months),
    ];

    match hours.into_iter().max_by(|a, b| a.1.total_cmp(&b.1)) {
        Some((field, total)) if total > params.hourly_wage => field,
        _ => "hourly_wage",
    }
}

fn revenue_overflow_field(params: &Parameters) -> &'static str {
    if params.fee_fixed > params.ticket_price { "fee_fixed" } else { "ticket_price" }
}

/// 使用默认费率的便捷入口
pub fn compute(params: &Parameters, horizon_years: u32) -> EngineResult<BreakEvenResult> {
    BreakEvenCalculator::default().compute(params, horizon_years)
}
