use tracing::warn;

use crate::models::{AppConfig, Parameters};

/// 支付通道费率 (百分比 + 每笔固定费)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub processor_percent: f64,
    pub processor_fixed: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            processor_percent: 0.012,
            processor_fixed: 0.25,
        }
    }
}

impl FeeSchedule {
    /// 配置中的费率非法时回退到默认费率
    pub fn from_config(config: &AppConfig) -> Self {
        let (pct, fixed) = (config.processor_fee_percent, config.processor_fee_fixed);
        let valid = pct.is_finite() && (0.0..=1.0).contains(&pct) && fixed.is_finite() && fixed >= 0.0;
        if valid {
            Self { processor_percent: pct, processor_fixed: fixed }
        } else {
            warn!("⚠️ 支付通道费率配置无效 ({} / {})，使用默认费率", pct, fixed);
            Self::default()
        }
    }

    pub fn processor_fee(&self, ticket_price: f64, enabled: bool) -> f64 {
        if enabled {
            ticket_price * self.processor_percent + self.processor_fixed
        } else {
            0.0
        }
    }

    /// 每张票的平台净收入，手续费超过票价时可为负
    pub fn net_revenue_per_ticket(&self, params: &Parameters) -> f64 {
        let processor = self.processor_fee(params.ticket_price, params.payment_processor_enabled);
        params.ticket_price * params.fee_percent + params.fee_fixed - processor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_parameters;

    #[test]
    fn net_revenue_without_processor() {
        let net = FeeSchedule::default().net_revenue_per_ticket(&sample_parameters());
        assert!((net - 1.1).abs() < 1e-12);
    }

    #[test]
    fn processor_fee_reduces_net_by_exact_amount() {
        let fees = FeeSchedule::default();
        let off = sample_parameters();
        let mut on = off.clone();
        on.payment_processor_enabled = true;

        let delta = fees.net_revenue_per_ticket(&off) - fees.net_revenue_per_ticket(&on);
        assert!((delta - 0.43).abs() < 1e-12);
        assert!((fees.processor_fee(15.0, true) - 0.43).abs() < 1e-12);
        assert_eq!(fees.processor_fee(15.0, false), 0.0);
    }

    #[test]
    fn net_revenue_may_go_negative() {
        let mut p = sample_parameters();
        p.fee_percent = 0.0;
        p.fee_fixed = 0.0;
        p.payment_processor_enabled = true;
        assert!(FeeSchedule::default().net_revenue_per_ticket(&p) < 0.0);
    }

    #[test]
    fn invalid_config_rates_fall_back_to_default() {
        let config = AppConfig { processor_fee_percent: f64::NAN, ..AppConfig::default() };
        assert_eq!(FeeSchedule::from_config(&config), FeeSchedule::default());

        let config = AppConfig { processor_fee_percent: 0.029, processor_fee_fixed: 0.3, ..AppConfig::default() };
        let fees = FeeSchedule::from_config(&config);
        assert_eq!(fees.processor_percent, 0.029);
        assert_eq!(fees.processor_fixed, 0.3);
    }
}
