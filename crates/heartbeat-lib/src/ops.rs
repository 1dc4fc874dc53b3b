//! Dynamic call surface over JSON values.
//!
//! Every operation can be invoked by name with its arguments given
//! positionally (in documented order), by name, or both, the way a host
//! language binding would pass them. Coercion from JSON enforces the same
//! argument contract as the typed functions: a value of the wrong kind is a
//! [`ErrorKind::Type`](crate::error::ErrorKind::Type) error, a value of the
//! right kind but wrong shape or range is a
//! [`ErrorKind::Value`](crate::error::ErrorKind::Value) error.

use crate::{
    detectors::{
        ecg::{detect_heartbeats_with_config, EcgPipelineConfig},
        integration::squared_moving_integration,
        thresholding::thresholding_with_config,
    },
    error::{BeatError, Result},
    metrics::{compare::compare_heartbeats, rri::rri_similarity},
    signal::TimeSeries,
};
use log::{debug, info};
use serde_json::{json, Map, Value};

/// Operations reachable through [`OpRegistry::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SquaredMovingIntegration,
    Thresholding,
    DetectHeartbeats,
    CompareHeartbeats,
    RriSimilarity,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::SquaredMovingIntegration,
        Operation::Thresholding,
        Operation::DetectHeartbeats,
        Operation::CompareHeartbeats,
        Operation::RriSimilarity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::SquaredMovingIntegration => "squared_moving_integration",
            Operation::Thresholding => "thresholding",
            Operation::DetectHeartbeats => "detect_heartbeats",
            Operation::CompareHeartbeats => "compare_heartbeats",
            Operation::RriSimilarity => "rri_similarity",
        }
    }

    /// Parameter names in positional order.
    pub fn params(&self) -> &'static [&'static str] {
        match self {
            Operation::SquaredMovingIntegration => &["x", "window_length"],
            Operation::Thresholding => &["filtered_ecg", "integrated_ecg", "fs"],
            Operation::DetectHeartbeats => &["ecg", "fs"],
            Operation::CompareHeartbeats => &["detection", "annotation", "max_distance"],
            Operation::RriSimilarity => &["detection", "annotation", "fs", "fs_resample"],
        }
    }

    /// Expected kind of each parameter, aligned with [`Operation::params`].
    pub fn kinds(&self) -> &'static [ArgKind] {
        use ArgKind::*;
        match self {
            Operation::SquaredMovingIntegration => &[Samples, Integer],
            Operation::Thresholding => &[Samples, Samples, Integer],
            Operation::DetectHeartbeats => &[Samples, Integer],
            Operation::CompareHeartbeats => &[Indices, Indices, Integer],
            Operation::RriSimilarity => &[Indices, Indices, Integer, Real],
        }
    }

    /// Number of leading parameters without a default.
    pub fn required(&self) -> usize {
        match self {
            Operation::SquaredMovingIntegration => 2,
            Operation::Thresholding => 3,
            Operation::DetectHeartbeats => 2,
            Operation::CompareHeartbeats => 2,
            Operation::RriSimilarity => 3,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

/// Kind of value a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Sequence of real samples.
    Samples,
    /// Sequence of integer sample indices.
    Indices,
    Integer,
    Real,
}

/// Positional and named arguments of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    named: Map<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Adds a named argument.
    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.named.insert(name.to_string(), value.into());
        self
    }

    /// A JSON array becomes positional arguments, an object named ones.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Array(positional) => Ok(Self {
                positional,
                named: Map::new(),
            }),
            Value::Object(named) => Ok(Self {
                positional: Vec::new(),
                named,
            }),
            other => Err(BeatError::type_error(
                "args",
                format!(
                    "arguments must be an array or an object, got {}",
                    kind_of(&other)
                ),
            )),
        }
    }

    /// Resolves the arguments against `op`'s parameter list.
    fn bind(&self, op: Operation) -> Result<Bound<'_>> {
        let params = op.params();
        if self.positional.len() > params.len() {
            return Err(BeatError::type_error(
                op.name(),
                format!(
                    "takes {} arguments but {} were given",
                    params.len(),
                    self.positional.len()
                ),
            ));
        }
        let mut values: Vec<Option<&Value>> = params
            .iter()
            .enumerate()
            .map(|(i, _)| self.positional.get(i))
            .collect();
        for (name, value) in &self.named {
            let Some(pos) = params.iter().position(|p| *p == name.as_str()) else {
                return Err(BeatError::type_error(
                    op.name(),
                    format!("got an unexpected argument '{}'", name),
                ));
            };
            if values[pos].is_some() {
                return Err(BeatError::type_error(
                    op.name(),
                    format!("got multiple values for argument '{}'", name),
                ));
            }
            values[pos] = Some(value);
        }
        if let Some(missing) = values[..op.required()].iter().position(|v| v.is_none()) {
            return Err(BeatError::type_error(
                op.name(),
                format!("missing required argument '{}'", params[missing]),
            ));
        }
        Ok(Bound { op, values })
    }
}

/// Arguments bound to parameter slots.
struct Bound<'a> {
    op: Operation,
    values: Vec<Option<&'a Value>>,
}

impl<'a> Bound<'a> {
    /// Kind checks of every bound argument, run before any shape or range check.
    fn check_kinds(&self) -> Result<()> {
        let params = self.op.params().iter().zip(self.op.kinds());
        for ((&name, &kind), value) in params.zip(&self.values) {
            if let Some(value) = value {
                check_kind(name, value, kind)?;
            }
        }
        Ok(())
    }

    fn required(&self, index: usize) -> Result<&'a Value> {
        self.values[index].ok_or_else(|| {
            BeatError::type_error(
                self.op.name(),
                format!(
                    "missing required argument '{}'",
                    self.op.params()[index]
                ),
            )
        })
    }

    fn optional(&self, index: usize) -> Option<&'a Value> {
        self.values[index]
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn check_kind(arg: &'static str, value: &Value, kind: ArgKind) -> Result<()> {
    match (kind, value) {
        (ArgKind::Samples | ArgKind::Indices, Value::Array(_) | Value::Number(_)) => {
            check_leaves(arg, value, kind)
        }
        (ArgKind::Samples | ArgKind::Indices, other) => Err(BeatError::type_error(
            arg,
            format!("expected a numeric sequence, got {}", kind_of(other)),
        )),
        (ArgKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(()),
        (ArgKind::Integer, Value::Number(n)) => Err(BeatError::type_error(
            arg,
            format!("expected an integer, got float {}", n),
        )),
        (ArgKind::Real, Value::Number(_)) => Ok(()),
        (ArgKind::Integer | ArgKind::Real, other) => Err(BeatError::type_error(
            arg,
            format!("expected a number, got {}", kind_of(other)),
        )),
    }
}

/// Every scalar inside a (possibly nested) sequence must be a number, and an
/// integer for index sequences. Nesting itself is a shape issue left to the
/// coercion step.
fn check_leaves(arg: &'static str, value: &Value, kind: ArgKind) -> Result<()> {
    match value {
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| check_leaves(arg, item, kind)),
        Value::Number(n) if kind == ArgKind::Indices && !(n.is_i64() || n.is_u64()) => Err(
            BeatError::type_error(arg, format!("index {} is not an integer", n)),
        ),
        Value::Number(_) => Ok(()),
        other => Err(BeatError::type_error(
            arg,
            format!("sequence holds {}, not a number", kind_of(other)),
        )),
    }
}

/// A one-dimensional numeric sequence.
fn sequence(arg: &'static str, value: &Value) -> Result<Vec<f64>> {
    let items = sequence_items(arg, value)?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Number(n) => n.as_f64().ok_or_else(|| {
                BeatError::type_error(arg, format!("element {} is not representable as f64", i))
            }),
            other => Err(element_error(arg, i, other)),
        })
        .collect()
}

/// A one-dimensional sequence of non-negative integer sample indices.
fn index_sequence(arg: &'static str, value: &Value) -> Result<Vec<usize>> {
    let items = sequence_items(arg, value)?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Number(n) => {
                if let Some(idx) = n.as_u64() {
                    usize::try_from(idx).map_err(|_| {
                        BeatError::value_error(arg, format!("element {} is out of range", i))
                    })
                } else if n.is_i64() {
                    Err(BeatError::value_error(
                        arg,
                        format!("element {} is a negative index ({})", i, n),
                    ))
                } else {
                    Err(BeatError::type_error(
                        arg,
                        format!("element {} is not an integer ({})", i, n),
                    ))
                }
            }
            other => Err(element_error(arg, i, other)),
        })
        .collect()
}

fn sequence_items<'a>(arg: &'static str, value: &'a Value) -> Result<&'a [Value]> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Number(_) => Err(BeatError::value_error(
            arg,
            "expected a 1-dimensional sequence, got a 0-dimensional value",
        )),
        other => Err(BeatError::type_error(
            arg,
            format!("expected a numeric sequence, got {}", kind_of(other)),
        )),
    }
}

fn element_error(arg: &'static str, index: usize, item: &Value) -> BeatError {
    match item {
        Value::Array(_) => BeatError::value_error(
            arg,
            "expected a 1-dimensional sequence, got a nested array",
        ),
        other => BeatError::type_error(
            arg,
            format!("element {} is {}, not a number", index, kind_of(other)),
        ),
    }
}

/// An exact integer. Floats are rejected even when integral.
fn integer(arg: &'static str, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.is_u64() {
                Err(BeatError::value_error(arg, format!("{} is out of range", n)))
            } else {
                Err(BeatError::type_error(
                    arg,
                    format!("expected an integer, got float {}", n),
                ))
            }
        }
        other => Err(BeatError::type_error(
            arg,
            format!("expected an integer, got {}", kind_of(other)),
        )),
    }
}

fn sampling_frequency(value: &Value) -> Result<u32> {
    let fs = integer("fs", value)?;
    if fs < 1 {
        return Err(BeatError::value_error(
            "fs",
            format!("sampling frequency must be a positive integer, got {}", fs),
        ));
    }
    u32::try_from(fs)
        .map_err(|_| BeatError::value_error("fs", format!("{} Hz is out of range", fs)))
}

fn real(arg: &'static str, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| BeatError::type_error(arg, "not representable as f64")),
        other => Err(BeatError::type_error(
            arg,
            format!("expected a number, got {}", kind_of(other)),
        )),
    }
}

/// Dispatches operations by name with JSON arguments.
#[derive(Debug, Clone, Default)]
pub struct OpRegistry {
    pipeline: EcgPipelineConfig,
}

impl OpRegistry {
    pub const DEFAULT_FS_RESAMPLE: f64 = 4.0;

    pub fn new(pipeline: EcgPipelineConfig) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &EcgPipelineConfig {
        &self.pipeline
    }

    pub fn supported_ops() -> Vec<&'static str> {
        Operation::ALL.iter().map(|op| op.name()).collect()
    }

    /// Invoke `op` with JSON parameters: an array (positional), an object
    /// (named) or nothing.
    pub fn execute_json(&self, op: &str, params: Option<Value>) -> Result<Value> {
        let args = CallArgs::from_value(params.unwrap_or(Value::Null))?;
        self.execute(op, &args)
    }

    pub fn execute(&self, op: &str, args: &CallArgs) -> Result<Value> {
        let op = Operation::from_name(op).ok_or_else(|| {
            BeatError::value_error("op", format!("unsupported operation {}", op))
        })?;
        let bound = args.bind(op)?;
        bound.check_kinds()?;
        debug!("executing {}", op.name());
        match op {
            Operation::SquaredMovingIntegration => {
                let x = sequence("x", bound.required(0)?)?;
                let window_length = integer("window_length", bound.required(1)?)?;
                let window_length = usize::try_from(window_length).map_err(|_| {
                    BeatError::value_error(
                        "window_length",
                        format!("window length must be positive, got {}", window_length),
                    )
                })?;
                let out = squared_moving_integration(&x, window_length)?;
                Ok(json!(out))
            }
            Operation::Thresholding => {
                let filtered = sequence("filtered_ecg", bound.required(0)?)?;
                let integrated = sequence("integrated_ecg", bound.required(1)?)?;
                let fs = sampling_frequency(bound.required(2)?)?;
                let beats =
                    thresholding_with_config(&filtered, &integrated, fs, &self.pipeline.threshold)?;
                Ok(json!(beats))
            }
            Operation::DetectHeartbeats => {
                let ecg = sequence("ecg", bound.required(0)?)?;
                let fs = sampling_frequency(bound.required(1)?)?;
                let events =
                    detect_heartbeats_with_config(&TimeSeries::new(fs, ecg), &self.pipeline)?;
                Ok(json!(events.indices))
            }
            Operation::CompareHeartbeats => {
                let detection = index_sequence("detection", bound.required(0)?)?;
                let annotation = index_sequence("annotation", bound.required(1)?)?;
                let max_distance = match bound.optional(2) {
                    Some(value) => {
                        let d = integer("max_distance", value)?;
                        usize::try_from(d).map_err(|_| {
                            BeatError::value_error(
                                "max_distance",
                                format!("must be non-negative, got {}", d),
                            )
                        })?
                    }
                    None => 0,
                };
                let result = compare_heartbeats(&detection, &annotation, max_distance);
                serde_json::to_value(result).map_err(|e| {
                    BeatError::value_error("op", format!("cannot encode match result: {}", e))
                })
            }
            Operation::RriSimilarity => {
                let detection = index_sequence("detection", bound.required(0)?)?;
                let annotation = index_sequence("annotation", bound.required(1)?)?;
                let fs = sampling_frequency(bound.required(2)?)?;
                let fs_resample = match bound.optional(3) {
                    Some(value) => real("fs_resample", value)?,
                    None => Self::DEFAULT_FS_RESAMPLE,
                };
                let r = rri_similarity(&detection, &annotation, fs, fs_resample)?;
                Ok(json!(r))
            }
        }
    }

    pub fn log_summary(&self) {
        info!("Registered operations: {:?}", Self::supported_ops());
        info!(
            "Pipeline band {:.1}-{:.1} Hz, integration window {:.3} s, refractory {:.3} s",
            self.pipeline.lowcut_hz,
            self.pipeline.highcut_hz,
            self.pipeline.integration_window_s,
            self.pipeline.threshold.refractory_s
        );
    }
}
