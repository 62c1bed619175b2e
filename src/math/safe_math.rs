//! # Safe Math Operations
//!
//! Overflow-checked arithmetic. Every balance mutation in the crate goes
//! through these instead of raw operators.

use crate::errors::{CoreResult, UmbraCoreError};

/// Macro to generate safe arithmetic functions
macro_rules! safe_arith {
    // Binary operations with checked methods
    ($fn_name:ident, $type:ty, $checked_method:ident, $error:expr) => {
        /// Safe $fn_name with overflow/underflow check
        pub fn $fn_name(a: $type, b: $type) -> CoreResult<$type> {
            a.$checked_method(b).ok_or($error)
        }
    };

    // Division operations with zero check
    (div, $fn_name:ident, $type:ty) => {
        /// Safe division with zero check
        pub fn $fn_name(a: $type, b: $type) -> CoreResult<$type> {
            if b == 0 {
                return Err(UmbraCoreError::DivisionByZero);
            }
            Ok(a / b)
        }
    };

    // Narrowing casts with max check
    (cast_max, $fn_name:ident, $from_type:ty, $to_type:ty, $max_val:expr) => {
        /// Safe cast from $from_type to $to_type
        pub fn $fn_name(value: $from_type) -> CoreResult<$to_type> {
            if value > $max_val {
                return Err(UmbraCoreError::MathOverflow);
            }
            Ok(value as $to_type)
        }
    };
}

// Generate basic arithmetic functions
safe_arith!(safe_add_u64, u64, checked_add, UmbraCoreError::MathOverflow);
safe_arith!(safe_sub_u64, u64, checked_sub, UmbraCoreError::MathUnderflow);
safe_arith!(safe_mul_u64, u64, checked_mul, UmbraCoreError::MathOverflow);
safe_arith!(div, safe_div_u64, u64);

safe_arith!(safe_add_u128, u128, checked_add, UmbraCoreError::MathOverflow);
safe_arith!(safe_sub_u128, u128, checked_sub, UmbraCoreError::MathUnderflow);
safe_arith!(safe_mul_u128, u128, checked_mul, UmbraCoreError::MathOverflow);
safe_arith!(div, safe_div_u128, u128);

// Generate type conversion functions
safe_arith!(cast_max, safe_cast_u128_to_u64, u128, u64, u64::MAX as u128);
