macro_rules! debug_warn {
    ($($x:tt)*) => {
        {
            #[cfg(debug_assertions)]
            {
                $crate::log_warning(format_args!($($x)*))
            }
            #[cfg(not(debug_assertions))]
            { }
        }
    }
}

pub(crate) use debug_warn;

/// Builds a raw [`Target`](crate::Target) object from literal entries.
///
/// ```
/// use argus_reactive::{object, Value};
///
/// let user = object! {
///     "name" => "ada",
///     "visits" => 3,
/// };
/// assert_eq!(user.raw_get(&"name".into()), Some(Value::from("ada")));
/// ```
#[macro_export]
macro_rules! object {
    () => { $crate::Target::object() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let target = $crate::Target::object();
        $( target.raw_set($crate::Key::from($key), $crate::Value::from($value)); )+
        target
    }};
}

/// Builds a raw [`Target`](crate::Target) array from literal items.
///
/// ```
/// use argus_reactive::array;
///
/// let primes = array![2, 3, 5];
/// assert_eq!(primes.raw_len(), 3);
/// ```
#[macro_export]
macro_rules! array {
    () => { $crate::Target::array() };
    ($($value:expr),+ $(,)?) => {{
        let target = $crate::Target::array();
        $( target.raw_push($crate::Value::from($value)); )+
        target
    }};
}
