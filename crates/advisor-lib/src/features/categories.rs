//! Categorical encodings with fixed integer codes
//!
//! Codes are part of the persisted model contract: a trained forest splits
//! on them, so they never change between training and inference.

use crate::models::{MoistureStatus, NutrientStatus, PhStatus};

/// pH below this value is acidic
pub const PH_ACIDIC_BELOW: f64 = 6.0;
/// pH above this value is alkaline
pub const PH_ALKALINE_ABOVE: f64 = 7.5;
/// Moisture below this value is low
pub const MOISTURE_LOW_BELOW: f64 = 30.0;
/// Moisture above this value is high
pub const MOISTURE_HIGH_ABOVE: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodOfDay {
    /// 22:00 to 05:00 (madrugada)
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl PeriodOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=17 => Self::Afternoon,
            18..=21 => Self::Evening,
            _ => Self::Night,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            Self::Night => 0.0,
            Self::Morning => 1.0,
            Self::Afternoon => 2.0,
            Self::Evening => 3.0,
        }
    }
}

/// Season by month, Southern Hemisphere convention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Summer,
    Autumn,
    Winter,
    Spring,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Self::Summer,
            3..=5 => Self::Autumn,
            6..=8 => Self::Winter,
            _ => Self::Spring,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            Self::Summer => 0.0,
            Self::Autumn => 1.0,
            Self::Winter => 2.0,
            Self::Spring => 3.0,
        }
    }
}

/// How many of the two tracked nutrients are present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NutrientNeed {
    Low,
    Medium,
    High,
}

impl NutrientNeed {
    pub fn from_flags(phosphorus: bool, potassium: bool) -> Self {
        match (phosphorus, potassium) {
            (true, true) => Self::High,
            (false, false) => Self::Low,
            _ => Self::Medium,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            Self::Low => 0.0,
            Self::Medium => 1.0,
            Self::High => 2.0,
        }
    }
}

pub fn ph_status(ph: f64) -> PhStatus {
    if ph < PH_ACIDIC_BELOW {
        PhStatus::Acidic
    } else if ph > PH_ALKALINE_ABOVE {
        PhStatus::Alkaline
    } else {
        PhStatus::Ideal
    }
}

pub fn ph_code(status: PhStatus) -> f64 {
    match status {
        PhStatus::Acidic => 0.0,
        PhStatus::Ideal => 1.0,
        PhStatus::Alkaline => 2.0,
    }
}

pub fn moisture_status(moisture: f64) -> MoistureStatus {
    if moisture < MOISTURE_LOW_BELOW {
        MoistureStatus::Low
    } else if moisture > MOISTURE_HIGH_ABOVE {
        MoistureStatus::High
    } else {
        MoistureStatus::Normal
    }
}

/// Nutrients count as sufficient only when both are present
pub fn nutrient_status(phosphorus: bool, potassium: bool) -> NutrientStatus {
    if phosphorus && potassium {
        NutrientStatus::Sufficient
    } else {
        NutrientStatus::Deficient
    }
}
