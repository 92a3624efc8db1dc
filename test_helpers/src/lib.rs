pub mod tracing;

/// A test helper function for asserting floating point numbers are within the machine epsilon
/// because strict comparison of floating point numbers is incorrect
pub fn approximately_equal(f1: f64, f2: f64) -> bool {
    (f1 - f2).abs() < f64::EPSILON
}

/// Asserts that `$res` is an `Err` matching `$error_pat` whose display
/// message contains `$needle`.
///
/// Line protocol errors are asserted on both their variant and the element
/// named in their message, e.g. `"key of tag"`.
#[macro_export]
macro_rules! assert_error {
    ($res:expr, $error_pat:pat, $needle:expr $(,)?) => {
        match $res {
            Err(e @ $error_pat) => {
                let msg = e.to_string();
                assert!(
                    msg.contains($needle),
                    "expected error message to contain {:?}, was: {:?}",
                    $needle,
                    msg,
                );
            }
            other => panic!(
                "expected error matching {}, was: {:?}",
                stringify!($error_pat),
                other,
            ),
        }
    };
}
