use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::{EngineError, EngineResult, ErrorBody};

// =========================================================================
// 1. 宏定义 (Macros)
// =========================================================================

macro_rules! serializable {
    ($($item:tt)*) => {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        $($item)*
    };
}

macro_rules! web_model {
    ($($item:tt)*) => {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        $($item)*
    };
}

// =========================================================================
// 2. 基础工具 (Utilities)
// =========================================================================

pub trait Roundable {
    fn round_2(self) -> f64;
}

impl Roundable for f64 {
    #[inline(always)]
    fn round_2(self) -> f64 {
        let scaled = self * 100.0;
        // 放大后溢出的极大值保持原样
        if scaled.is_finite() { scaled.round() / 100.0 } else { self }
    }
}

// =========================================================================
// 3. 服务配置
// =========================================================================

serializable! {
    #[serde(default)]
    pub struct AppConfig {
        pub port: u16,
        pub max_horizon_years: u32,
        pub processor_fee_percent: f64,
        pub processor_fee_fixed: f64,
        pub enforce_preset_bounds: bool,
        pub cache_capacity: usize,
        pub request_timeout_secs: u64,
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 9982,
            max_horizon_years: 10,
            processor_fee_percent: 0.012,
            processor_fee_fixed: 0.25,
            enforce_preset_bounds: false,
            cache_capacity: 1000,
            request_timeout_secs: 10,
        }
    }
}

// =========================================================================
// 4. 计算参数 (不可变值对象)
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    #[validate(range(exclusive_min = 0.0, message = "must be greater than 0"))]
    pub hourly_wage: f64,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub dev_hours: f64,
    /// 第 1-6 月每月维护工时
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub maintenance_hours_h1: f64,
    /// 第 7-12 月每月维护工时
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub maintenance_hours_h2: f64,
    /// 第 13 月起每月维护工时
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub maintenance_hours_from_year2: f64,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub sales_hours_per_month: f64,
    #[validate(range(exclusive_min = 0.0, message = "must be greater than 0"))]
    pub ticket_price: f64,
    /// 小数形式，0.04 = 4%
    #[validate(range(min = 0.0, max = 1.0, message = "must be within [0, 1]"))]
    pub fee_percent: f64,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub fee_fixed: f64,
    #[serde(default)]
    pub payment_processor_enabled: bool,
    #[validate(length(min = 1, message = "must contain at least one year"))]
    pub tickets_per_month_by_year: Vec<u64>,
}

impl Parameters {
    const NUMERIC_FIELDS: [&'static str; 9] = [
        "hourly_wage",
        "dev_hours",
        "maintenance_hours_h1",
        "maintenance_hours_h2",
        "maintenance_hours_from_year2",
        "sales_hours_per_month",
        "ticket_price",
        "fee_percent",
        "fee_fixed",
    ];

    fn numeric_values(&self) -> [f64; 9] {
        [
            self.hourly_wage,
            self.dev_hours,
            self.maintenance_hours_h1,
            self.maintenance_hours_h2,
            self.maintenance_hours_from_year2,
            self.sales_hours_per_month,
            self.ticket_price,
            self.fee_percent,
            self.fee_fixed,
        ]
    }

    /// 边界校验：按字段声明顺序报告第一个违规项
    pub fn check(&self) -> EngineResult<()> {
        // range 校验对 NaN 不生效，先单独拦截非有限值
        for (name, value) in Self::NUMERIC_FIELDS.iter().zip(self.numeric_values()) {
            if !value.is_finite() {
                return Err(EngineError::invalid(*name, "must be a finite number"));
            }
        }

        let Err(errors) = self.validate() else {
            return Ok(());
        };
        let fields = errors.field_errors();

        Self::NUMERIC_FIELDS
            .iter()
            .copied()
            .chain(std::iter::once("tickets_per_month_by_year"))
            .find_map(|name| {
                fields.get(name).and_then(|list| list.first()).map(|err| {
                    let constraint = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    EngineError::invalid(name, constraint)
                })
            })
            .map_or(Ok(()), Err)
    }

    /// 记忆化缓存键：浮点按位比较，保证同参同果
    pub fn cache_key(&self, horizon_years: u32) -> CacheKey {
        CacheKey {
            numeric_bits: self.numeric_values().map(f64::to_bits),
            payment_processor_enabled: self.payment_processor_enabled,
            tickets_per_month_by_year: self.tickets_per_month_by_year.clone(),
            horizon_years,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    numeric_bits: [u64; 9],
    payment_processor_enabled: bool,
    tickets_per_month_by_year: Vec<u64>,
    horizon_years: u32,
}

// =========================================================================
// 5. 计算结果
// =========================================================================

serializable! {
    pub struct BreakEvenResult {
        pub horizon_months: u32,
        pub net_revenue_per_ticket: f64,
        pub processor_fee_per_ticket: f64,
        pub development_cost: f64,
        pub monthly_cost_series: Vec<f64>,
        pub monthly_ticket_volume_series: Vec<u64>,
        pub cumulative_revenue_series: Vec<f64>,
        pub cumulative_cost_series: Vec<f64>,
        /// 1-based；在周期内未达到则为 None
        pub break_even_month: Option<u32>,
    }
}

serializable! {
    pub struct Summary {
        pub break_even_reached: bool,
        pub headline: String,
        pub processor_fee_line: String,
        pub net_revenue_line: String,
    }
}

serializable! {
    pub struct ChartData {
        pub title: String,
        pub x_label: String,
        pub y_label: String,
        pub months: Vec<u32>,
        pub cumulative_revenue: Vec<f64>,
        pub cumulative_cost: Vec<f64>,
        pub break_even_marker: Option<u32>,
    }
}

serializable! {
    pub struct ParameterBound {
        pub field: String,
        pub min: f64,
        pub max: f64,
        pub step: f64,
    }
}

serializable! {
    pub struct Preset {
        pub name: String,
        pub title: String,
        pub horizon_years: u32,
        pub processor_toggle_available: bool,
        pub defaults: Parameters,
        pub bounds: Vec<ParameterBound>,
    }
}

// =========================================================================
// 6. API 请求 / 响应
// =========================================================================

web_model! {
    pub struct BreakEvenRequest {
        #[serde(flatten)]
        pub parameters: Parameters,
        /// 缺省时由逐年票量预测的长度推导
        #[serde(default)]
        pub horizon_years: Option<u32>,
    }
}

impl BreakEvenRequest {
    /// 从 JSON 值解码；类型错误、缺失字段均按 InvalidParameter 报告字段路径
    pub fn from_json(mut value: Value) -> EngineResult<Self> {
        let horizon = value
            .as_object_mut()
            .and_then(|obj| obj.remove("horizonYears"))
            .unwrap_or(Value::Null);

        Ok(Self {
            horizon_years: decode(horizon, "horizon_years")?,
            parameters: decode(value, "body")?,
        })
    }

    pub fn resolved_horizon(&self) -> u32 {
        self.horizon_years
            .unwrap_or(self.parameters.tickets_per_month_by_year.len() as u32)
    }
}

web_model! {
    pub struct BreakEvenResponse {
        pub result: BreakEvenResult,
        pub summary: Summary,
        pub chart: ChartData,
    }
}

web_model! {
    pub struct BatchRequest {
        /// 逐条解码，单条格式错误不影响其余场景
        pub requests: Vec<Value>,
    }
}

web_model! {
    pub struct BatchEntry {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub response: Option<BreakEvenResponse>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<ErrorBody>,
    }
}

web_model! {
    pub struct BatchResponse {
        pub results: Vec<BatchEntry>,
    }
}

// 不使用 flatten 直接解码，保留 serde 的字段路径
fn decode<T: DeserializeOwned>(value: Value, root: &str) -> EngineResult<T> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let message = err.inner().to_string();
        let path = err.path().to_string();
        let field = if path == "." {
            message
                .strip_prefix("missing field `")
                .and_then(|rest| rest.split('`').next())
                .map(snake_case)
                .unwrap_or_else(|| root.to_string())
        } else {
            snake_case(&path)
        };
        EngineError::invalid(field, message)
    })
}

/// ticketsPerMonthByYear[0] -> tickets_per_month_by_year[0]
fn snake_case(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 4);
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
