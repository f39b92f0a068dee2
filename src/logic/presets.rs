use crate::error::{EngineError, EngineResult};
use crate::models::{ParameterBound, Parameters, Preset};

// 滑块区间 (min, max, step)
const SCALAR_BOUNDS: [(&str, f64, f64, f64); 9] = [
    ("hourly_wage", 10.0, 50.0, 1.0),
    ("dev_hours", 50.0, 200.0, 1.0),
    ("maintenance_hours_h1", 10.0, 50.0, 1.0),
    ("maintenance_hours_h2", 5.0, 30.0, 1.0),
    ("maintenance_hours_from_year2", 1.0, 20.0, 1.0),
    ("sales_hours_per_month", 5.0, 50.0, 1.0),
    ("ticket_price", 5.0, 50.0, 1.0),
    ("fee_percent", 0.01, 0.10, 0.01),
    ("fee_fixed", 0.0, 5.0, 0.1),
];

// 各年度月票量区间，第 5 年起不设上限
const TICKET_BOUNDS: [(f64, f64); 4] = [
    (100.0, 2000.0),
    (500.0, 3000.0),
    (1000.0, 5000.0),
    (1500.0, 7000.0),
];

const DEFAULT_TICKETS: [u64; 4] = [500, 1000, 1500, 2000];

fn default_parameters(years: usize) -> Parameters {
    Parameters {
        hourly_wage: 23.0,
        dev_hours: 100.0,
        maintenance_hours_h1: 25.0,
        maintenance_hours_h2: 15.0,
        maintenance_hours_from_year2: 5.0,
        sales_hours_per_month: 20.0,
        ticket_price: 15.0,
        fee_percent: 0.04,
        fee_fixed: 0.5,
        payment_processor_enabled: false,
        tickets_per_month_by_year: DEFAULT_TICKETS[..years].to_vec(),
    }
}

fn ticket_field(year_idx: usize) -> String {
    format!("tickets_per_month_by_year[{year_idx}]")
}

fn bounds(years: usize) -> Vec<ParameterBound> {
    let scalars = SCALAR_BOUNDS.iter().map(|&(field, min, max, step)| ParameterBound {
        field: field.to_string(),
        min,
        max,
        step,
    });
    let tickets = TICKET_BOUNDS[..years].iter().enumerate().map(|(i, &(min, max))| ParameterBound {
        field: ticket_field(i),
        min,
        max,
        step: 1.0,
    });
    scalars.chain(tickets).collect()
}

pub fn presets() -> Vec<Preset> {
    vec![
        Preset {
            name: "three_year".into(),
            title: "Break-even analysis ticketing/registration platform (3 years)".into(),
            horizon_years: 3,
            processor_toggle_available: false,
            defaults: default_parameters(3),
            bounds: bounds(3),
        },
        Preset {
            name: "four_year".into(),
            title: "Break-even analysis ticketing/registration platform (4 years)".into(),
            horizon_years: 4,
            processor_toggle_available: true,
            defaults: default_parameters(4),
            bounds: bounds(4),
        },
    ]
}

pub fn preset(name: &str) -> EngineResult<Preset> {
    presets()
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| EngineError::UnknownPreset(name.to_string()))
}

/// 按滑块区间校验参数 (仅在配置开启 enforce_preset_bounds 时调用)
pub fn check_bounds(params: &Parameters) -> EngineResult<()> {
    let scalars = [
        params.hourly_wage,
        params.dev_hours,
        params.maintenance_hours_h1,
        params.maintenance_hours_h2,
        params.maintenance_hours_from_year2,
        params.sales_hours_per_month,
        params.ticket_price,
        params.fee_percent,
        params.fee_fixed,
    ];

    for (&(field, min, max, _), value) in SCALAR_BOUNDS.iter().zip(scalars) {
        if !(min..=max).contains(&value) {
            return Err(EngineError::invalid(field, format!("must be within [{min}, {max}]")));
        }
    }

    for (i, (&tickets, &(min, max))) in params
        .tickets_per_month_by_year
        .iter()
        .zip(TICKET_BOUNDS.iter())
        .enumerate()
    {
        if !(min..=max).contains(&(tickets as f64)) {
            return Err(EngineError::invalid(ticket_field(i), format!("must be within [{min}, {max}]")));
        }
    }

    Ok(())
}
