//! 月度序列：成本、票量、累计值与盈亏平衡点搜索

use crate::models::Parameters;

use super::constants::{FIRST_HALF_MONTHS, MONTHS_PER_YEAR};

/// 第 `month` 月 (1-based) 的维护工时
/// 前 6 个月、后 6 个月、第二年起三档；第二年起按每月工时计，不再除以 12
#[inline]
pub fn maintenance_hours(params: &Parameters, month: usize) -> f64 {
    if month <= FIRST_HALF_MONTHS {
        params.maintenance_hours_h1
    } else if month <= MONTHS_PER_YEAR {
        params.maintenance_hours_h2
    } else {
        params.maintenance_hours_from_year2
    }
}

/// 每月经常性成本 = 维护成本 + 销售成本
pub fn monthly_cost_series(params: &Parameters, horizon_months: usize) -> Vec<f64> {
    let sales_cost = params.sales_hours_per_month * params.hourly_wage;
    (1..=horizon_months)
        .map(|m| maintenance_hours(params, m) * params.hourly_wage + sales_cost)
        .collect()
}

/// 每年的月票量在该年 12 个月内重复
pub fn ticket_volume_series(tickets_per_month_by_year: &[u64], horizon_months: usize) -> Vec<u64> {
    (0..horizon_months)
        .map(|i| tickets_per_month_by_year[i / MONTHS_PER_YEAR])
        .collect()
}

pub fn cumulative_revenue_series(volume: &[u64], net_revenue_per_ticket: f64) -> Vec<f64> {
    volume
        .iter()
        .scan(0.0, |acc, &tickets| {
            *acc += tickets as f64 * net_revenue_per_ticket;
            Some(*acc)
        })
        .collect()
}

/// 第 1 月只计开发成本；之后每月累加上一个月的经常性成本 (成本滞后一个月确认)
pub fn cumulative_cost_series(development_cost: f64, monthly_cost: &[f64]) -> Vec<f64> {
    let Some((_, recognized)) = monthly_cost.split_last() else {
        return Vec::new();
    };

    std::iter::once(&development_cost)
        .chain(recognized)
        .scan(0.0, |acc, &cost| {
            *acc += cost;
            Some(*acc)
        })
        .collect()
}

/// 累计收入首次不低于累计成本的月份 (1-based)
pub fn first_crossing(cumulative_revenue: &[f64], cumulative_cost: &[f64]) -> Option<u32> {
    cumulative_revenue
        .iter()
        .zip(cumulative_cost)
        .position(|(revenue, cost)| revenue >= cost)
        .map(|idx| idx as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_parameters;

    #[test]
    fn maintenance_tiers_switch_at_months_7_and_13() {
        let p = sample_parameters();
        assert_eq!(maintenance_hours(&p, 1), 25.0);
        assert_eq!(maintenance_hours(&p, 6), 25.0);
        assert_eq!(maintenance_hours(&p, 7), 15.0);
        assert_eq!(maintenance_hours(&p, 12), 15.0);
        assert_eq!(maintenance_hours(&p, 13), 5.0);
        assert_eq!(maintenance_hours(&p, 48), 5.0);
    }

    #[test]
    fn monthly_costs_include_flat_sales_cost() {
        let costs = monthly_cost_series(&sample_parameters(), 36);
        assert_eq!(costs.len(), 36);
        assert_eq!(costs[0], 575.0 + 460.0);
        assert_eq!(costs[6], 345.0 + 460.0);
        assert_eq!(costs[12], 115.0 + 460.0);
        assert_eq!(costs[35], 115.0 + 460.0);
    }

    #[test]
    fn ticket_volume_repeats_per_year() {
        let volume = ticket_volume_series(&[500, 1000, 1500], 36);
        assert_eq!(volume.len(), 36);
        assert!(volume[..12].iter().all(|&v| v == 500));
        assert!(volume[12..24].iter().all(|&v| v == 1000));
        assert!(volume[24..].iter().all(|&v| v == 1500));
    }

    #[test]
    fn cost_is_recognized_one_month_late() {
        let cumulative = cumulative_cost_series(2300.0, &[10.0, 20.0, 30.0]);
        // 最后一个月的成本落在周期之外
        assert_eq!(cumulative, vec![2300.0, 2310.0, 2330.0]);
    }

    #[test]
    fn revenue_accumulates_volume_times_net() {
        let cumulative = cumulative_revenue_series(&[10, 10, 20], 2.0);
        assert_eq!(cumulative, vec![20.0, 40.0, 80.0]);
    }

    #[test]
    fn crossing_is_first_month_and_one_based() {
        assert_eq!(first_crossing(&[0.0, 5.0, 12.0, 20.0], &[10.0, 10.0, 11.0, 12.0]), Some(3));
        assert_eq!(first_crossing(&[0.0, 0.0], &[0.0, 1.0]), Some(1));
        assert_eq!(first_crossing(&[1.0, 2.0], &[5.0, 5.0]), None);
    }
}
