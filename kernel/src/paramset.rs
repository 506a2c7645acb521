//! Parameter Sets
//!
//! Named integrator parameters, as read from a scene description or set
//! programmatically.

use crate::common::*;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;

/// Stores a parameter set item consisting of a list of values of type `T`.
#[derive(Clone, Default)]
pub struct ParamSetItem<T> {
    /// The values.
    pub values: Vec<T>,

    /// Indicates if the parameter set item was ever read back.
    looked_up: Cell<bool>,
}

impl<T> ParamSetItem<T> {
    /// Create new `ParamSetItem<T>`.
    ///
    /// * `values` - The values.
    pub fn new(values: Vec<T>) -> Self {
        Self {
            values,
            looked_up: Cell::new(false),
        }
    }

    /// Returns true if the item was read back.
    pub fn looked_up(&self) -> bool {
        self.looked_up.get()
    }
}

/// A hashmap of parameter set items stored by name.
pub type ParamSetMap<T> = HashMap<String, ParamSetItem<T>>;

/// Stores parameter set items of different types in hashmaps.
#[derive(Clone, Default)]
pub struct ParamSet {
    pub bools: ParamSetMap<bool>,
    pub ints: ParamSetMap<Int>,
    pub floats: ParamSetMap<Float>,
    pub strings: ParamSetMap<String>,
}

/// Define a macro that can be used to generate a function for adding/replacing
/// parameter set item.
macro_rules! paramset_add {
    ($func: ident, $t: ty, $paramset: ident) => {
        pub fn $func(&mut self, name: &str, values: &[$t]) {
            self.$paramset
                .insert(String::from(name), ParamSetItem::new(values.to_vec()));
        }
    };
}

/// Define a macro that can be used to generate a function for removing
/// parameter set item.
macro_rules! paramset_erase {
    ($func: ident, $paramset: ident) => {
        pub fn $func(&mut self, name: &str) -> bool {
            self.$paramset.remove(name).is_some()
        }
    };
}

/// Define a macro that can be used to generate a function for finding
/// parameter set item that is stored as a single item.
macro_rules! paramset_find_one {
    ($func: ident, $t: ty, $paramset: ident) => {
        pub fn $func(&self, name: &str, default: $t) -> $t {
            match self.$paramset.get(name) {
                Some(param) if param.values.len() == 1 => {
                    param.looked_up.set(true);
                    param.values[0].clone()
                }
                _ => default,
            }
        }
    };
}

/// Define a macro that can be used to print parameter set items.
macro_rules! display_param {
    ($params: expr, $param_type: literal, $formatter: expr) => {
        for (name, param) in $params.iter() {
            write!($formatter, "\"{} {}\" [", $param_type, name)?;
            for (i, v) in param.values.iter().enumerate() {
                if i > 0 {
                    write!($formatter, " ")?;
                }
                write!($formatter, "{}", v)?;
            }
            writeln!($formatter, "]")?;
        }
    };
}

impl ParamSet {
    /// Returns a new `ParamSet`.
    pub fn new() -> Self {
        Self::default()
    }

    paramset_erase!(erase_int, ints);
    paramset_find_one!(find_one_int, Int, ints);
    paramset_add!(add_int, Int, ints);

    paramset_erase!(erase_bool, bools);
    paramset_find_one!(find_one_bool, bool, bools);
    paramset_add!(add_bool, bool, bools);

    paramset_erase!(erase_float, floats);
    paramset_find_one!(find_one_float, Float, floats);
    paramset_add!(add_float, Float, floats);

    paramset_erase!(erase_string, strings);
    paramset_find_one!(find_one_string, String, strings);
    paramset_add!(add_string, String, strings);

    /// Logs a warning for every parameter that was never read back.
    pub fn report_unused(&self) {
        let unused = self
            .bools
            .iter()
            .filter(|(_, p)| !p.looked_up())
            .map(|(n, _)| n)
            .chain(self.ints.iter().filter(|(_, p)| !p.looked_up()).map(|(n, _)| n))
            .chain(self.floats.iter().filter(|(_, p)| !p.looked_up()).map(|(n, _)| n))
            .chain(self.strings.iter().filter(|(_, p)| !p.looked_up()).map(|(n, _)| n));
        for name in unused {
            warn!("Parameter '{}' not used", name);
        }
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_param!(self.bools, "bool", f);
        display_param!(self.ints, "integer", f);
        display_param!(self.floats, "float", f);
        display_param!(self.strings, "string", f);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_one_returns_default_when_missing() {
        let params = ParamSet::new();
        assert_eq!(params.find_one_int("maxbounce", 5), 5);
        assert!(params.find_one_bool("transparentshadows", true));
    }

    #[test]
    fn find_one_ignores_lists() {
        let mut params = ParamSet::new();
        params.add_int("aosamples", &[1, 2]);
        assert_eq!(params.find_one_int("aosamples", 3), 3);
    }

    #[test]
    fn add_replace_and_erase() {
        let mut params = ParamSet::new();
        params.add_float("aodistance", &[2.0]);
        params.add_float("aodistance", &[4.0]);
        assert_eq!(params.find_one_float("aodistance", 1.0), 4.0);
        assert!(params.erase_float("aodistance"));
        assert!(!params.erase_float("aodistance"));
    }

    #[test]
    fn lookups_are_tracked() {
        let mut params = ParamSet::new();
        params.add_string("shadowstrategy", &[String::from("stepthrough")]);
        params.add_bool("lightpasses", &[true]);
        let _ = params.find_one_string("shadowstrategy", String::new());
        assert!(params.strings["shadowstrategy"].looked_up());
        assert!(!params.bools["lightpasses"].looked_up());
    }

    #[test]
    fn display_lists_values() {
        let mut params = ParamSet::new();
        params.add_int("diffusesamples", &[4]);
        assert_eq!(format!("{}", params), "\"integer diffusesamples\" [4]\n");
    }
}
