//! Key derivation for cached functions
//!
//! A [`Namespace`] identifies the wrapped function (`"{module}.{function}"`);
//! the physical key stored on disk is `"{namespace}-{subkey}"`.

use std::fmt;

/// Identity of a wrapped function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(module: &str, function: &str) -> Self {
        Self(format!("{}.{}", module, function))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Physical key for a sub-key within this namespace
    pub fn key_for(&self, subkey: &str) -> String {
        format!("{}-{}", self.0, subkey)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds a [`Namespace`] for a function in the calling module
///
/// ```
/// let ns = keepsake::namespace!("login");
/// assert!(ns.as_str().ends_with(".login"));
/// ```
#[macro_export]
macro_rules! namespace {
    ($function:expr) => {
        $crate::cache::Namespace::new(module_path!(), $function)
    };
}

/// Which argument of a wrapped call provides the sub-key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyArg {
    /// Every call shares the constant sub-key `""`
    #[default]
    None,
    /// The argument at this position is formatted into the sub-key
    Index(usize),
}

/// Argument lists that can supply a sub-key
///
/// Implemented for `()` and tuples of up to four `Display` arguments.
pub trait KeyArgs {
    const ARITY: usize;

    /// Formats the argument at `index`, or `None` if there is no such argument
    fn key_at(&self, index: usize) -> Option<String>;
}

impl KeyArgs for () {
    const ARITY: usize = 0;

    fn key_at(&self, _index: usize) -> Option<String> {
        None
    }
}

macro_rules! impl_key_args {
    ($arity:expr; $($idx:tt $name:ident),+) => {
        impl<$($name: fmt::Display),+> KeyArgs for ($($name,)+) {
            const ARITY: usize = $arity;

            fn key_at(&self, index: usize) -> Option<String> {
                match index {
                    $($idx => Some(self.$idx.to_string()),)+
                    _ => None,
                }
            }
        }
    };
}

impl_key_args!(1; 0 A);
impl_key_args!(2; 0 A, 1 B);
impl_key_args!(3; 0 A, 1 B, 2 C);
impl_key_args!(4; 0 A, 1 B, 2 C, 3 D);

impl KeyArg {
    /// Sub-key for a call with the given arguments
    pub fn subkey<A: KeyArgs>(&self, args: &A) -> String {
        match self {
            KeyArg::None => String::new(),
            KeyArg::Index(index) => args.key_at(*index).unwrap_or_default(),
        }
    }

    /// Checks that the index exists on an argument list of type `A`
    pub fn fits<A: KeyArgs>(&self) -> bool {
        match self {
            KeyArg::None => true,
            KeyArg::Index(index) => *index < A::ARITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_formats_module_and_function() {
        let ns = Namespace::new("app::extractor::pixiv", "login");
        assert_eq!(ns.as_str(), "app::extractor::pixiv.login");
        assert_eq!(ns.key_for("user"), "app::extractor::pixiv.login-user");
        assert_eq!(ns.key_for(""), "app::extractor::pixiv.login-");
    }

    #[test]
    fn test_namespace_macro_uses_calling_module() {
        let ns = crate::namespace!("fetch");
        assert_eq!(ns.as_str(), format!("{}.fetch", module_path!()));
    }

    #[test]
    fn test_distinct_functions_never_share_physical_keys() {
        let a = Namespace::new("m", "a");
        let b = Namespace::new("m", "b");
        assert_ne!(a.key_for("1"), b.key_for("1"));
    }

    #[test]
    fn test_key_arg_none_is_constant() {
        assert_eq!(KeyArg::None.subkey(&(1, 2, 3)), "");
        assert_eq!(KeyArg::None.subkey(&()), "");
    }

    #[test]
    fn test_key_arg_index_selects_argument() {
        let args = (1, "two", 3.5);
        assert_eq!(KeyArg::Index(0).subkey(&args), "1");
        assert_eq!(KeyArg::Index(1).subkey(&args), "two");
        assert_eq!(KeyArg::Index(2).subkey(&args), "3.5");
    }

    #[test]
    fn test_key_arg_fits_checks_arity() {
        assert!(KeyArg::Index(2).fits::<(i32, i32, i32)>());
        assert!(!KeyArg::Index(3).fits::<(i32, i32, i32)>());
        assert!(!KeyArg::Index(0).fits::<()>());
        assert!(KeyArg::None.fits::<()>());
    }
}
