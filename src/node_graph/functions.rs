use std::collections::HashMap;

use once_cell::sync::Lazy;

/// One entry in the fixed function registry: a pure float mapping with a
/// first-class parameter list, introspectable so the host UI can enumerate
/// functions and the graph can grow matching input sockets.
pub struct FunctionDef {
    pub key: &'static str,
    pub label: &'static str,
    pub params: &'static [&'static str],
    pub eval: fn(&[f64]) -> f64,
}

fn arg(args: &[f64], index: usize) -> f64 {
    args.get(index).copied().unwrap_or(0.0)
}

/// Scales a velocity and clamps it into `[min_value, max_value]`.
fn adjust_velocity(args: &[f64]) -> f64 {
    let scaled = arg(args, 0) * arg(args, 1);
    let min_value = arg(args, 2);
    let max_value = arg(args, 3);
    scaled.min(max_value).max(min_value)
}

/// Weighted product minus an offset.
fn weighted_offset(args: &[f64]) -> f64 {
    arg(args, 0) * arg(args, 1) - arg(args, 2)
}

pub static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef {
        key: "adjust_velocity",
        label: "Adjusts by velocity",
        params: &["velocity", "multiplier", "min_value", "max_value"],
        eval: adjust_velocity,
    },
    FunctionDef {
        key: "weighted_offset",
        label: "Weighted offset",
        params: &["factor_a", "factor_b", "offset"],
        eval: weighted_offset,
    },
];

static BY_KEY: Lazy<HashMap<&'static str, &'static FunctionDef>> =
    Lazy::new(|| FUNCTIONS.iter().map(|f| (f.key, f)).collect());

pub fn function(key: &str) -> Option<&'static FunctionDef> {
    BY_KEY.get(key).copied()
}

pub fn function_keys() -> Vec<&'static str> {
    FUNCTIONS.iter().map(|f| f.key).collect()
}
