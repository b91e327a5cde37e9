use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Movement command understood by the device and echoed back in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationCode {
    Forward = 1,
    Back = 2,
    Stop = 3,
    Left = 4,
    Right = 5,
    HookLeft = 6,
    ForwardLeft = 7,
    SpinLeft = 8,
    HookRight = 9,
    ForwardRight = 10,
    SpinRight = 11,
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl OperationCode {
    pub const ALL: [OperationCode; 11] = [
        OperationCode::Forward,
        OperationCode::Back,
        OperationCode::Stop,
        OperationCode::Left,
        OperationCode::Right,
        OperationCode::HookLeft,
        OperationCode::ForwardLeft,
        OperationCode::SpinLeft,
        OperationCode::HookRight,
        OperationCode::ForwardRight,
        OperationCode::SpinRight,
    ];

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|operation| operation.code() == code)
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn label(self) -> &'static str {
        match self {
            OperationCode::Forward => "forward",
            OperationCode::Back => "back",
            OperationCode::Stop => "stop",
            OperationCode::Left => "left",
            OperationCode::Right => "right",
            OperationCode::HookLeft => "hook-left",
            OperationCode::ForwardLeft => "forward-left",
            OperationCode::SpinLeft => "spin-left",
            OperationCode::HookRight => "hook-right",
            OperationCode::ForwardRight => "forward-right",
            OperationCode::SpinRight => "spin-right",
        }
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accepts either the numeric code or the label (`3`, `stop`).
impl FromStr for OperationCode {
    type Err = UnknownOperation;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();

        if let Ok(code) = trimmed.parse::<i64>() {
            return Self::from_code(code).ok_or_else(|| UnknownOperation(trimmed.to_string()));
        }

        let normalized = trimmed.to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|operation| operation.label() == normalized)
            .ok_or_else(|| UnknownOperation(trimmed.to_string()))
    }
}
