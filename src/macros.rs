//! Construction macros for key paths and field lists.

/// Builds a [`KeyPath`](crate::path::KeyPath) from anything convertible to
/// [`Value`](crate::value::Value).
///
/// # Examples
///
/// ```rust
/// use fieldstone::path;
/// use fieldstone::value::Value;
///
/// let key_path = path!["users", 3, "name"];
/// assert_eq!(key_path[0], Value::from("users"));
/// assert_eq!(key_path[1], Value::from(3));
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::path::KeyPath::new()
    };
    ($($key:expr),+ $(,)?) => {
        $crate::path::KeyPath::from_vec(vec![$($crate::value::Value::from($key)),+])
    };
}

/// Builds a `Vec<(String, Value)>` field list for
/// [`RecordFactory`](crate::record::RecordFactory) defaults and overrides.
///
/// # Examples
///
/// ```rust
/// use fieldstone::fields;
/// use fieldstone::record::RecordFactory;
/// use fieldstone::value::Value;
///
/// let factory = RecordFactory::named("Foo", fields! {
///     "x" => 1,
///     "y" => true,
/// });
///
/// let foo = factory.build(fields! { "y" => false });
/// assert_eq!(foo.get("x"), Some(&Value::from(1)));
/// assert_eq!(foo.get("y"), Some(&Value::from(false)));
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        ::std::vec::Vec::<(::std::string::String, $crate::value::Value)>::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {
        vec![$((
            ::std::string::String::from($name),
            $crate::value::Value::from($value),
        )),+]
    };
}
