//! Incremental multi-factor boolean aggregation.
//!
//! A [`Factors`] value holds a set of named boolean factors and a cached
//! combination of them. The combination is chosen by a [`Combinator`]:
//! [`AnyOf`] (logical OR, identity `false`) or [`AllOf`] (logical AND,
//! identity `true`).
//!
//! Updates take an O(1) path whenever the new cached result can be derived
//! from the old one, and fall back to an O(n) fold otherwise:
//!
//! | operation                         | path  |
//! |-----------------------------------|-------|
//! | insert a new factor               | O(1)  |
//! | set any factor to the absorbing value (`true` for OR, `false` for AND) | O(1) |
//! | set an existing factor to the identity value | fold |
//! | remove a factor holding the identity value   | O(1) |
//! | remove a factor holding the absorbing value  | fold |
//!
//! The cached result always equals `fold(combine, IDENTITY, factors)` once a
//! public method returns.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Monotone boolean combination used by [`Factors`].
pub trait Combinator: Send + Sync + 'static {
    /// Result of combining zero factors.
    const IDENTITY: bool;

    /// Short name used in diagnostics.
    const NAME: &'static str;

    fn combine(lhs: bool, rhs: bool) -> bool;

    /// The value that forces the combination regardless of other factors.
    fn absorbing() -> bool {
        !Self::IDENTITY
    }
}

/// Logical OR over all factors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnyOf;

impl Combinator for AnyOf {
    const IDENTITY: bool = false;
    const NAME: &'static str = "or";

    fn combine(lhs: bool, rhs: bool) -> bool {
        lhs || rhs
    }
}

/// Logical AND over all factors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllOf;

impl Combinator for AllOf {
    const IDENTITY: bool = true;
    const NAME: &'static str = "and";

    fn combine(lhs: bool, rhs: bool) -> bool {
        lhs && rhs
    }
}

/// Named boolean factors with a cached combined result.
pub struct Factors<C: Combinator> {
    factors: HashMap<String, bool>,
    result: bool,
    recomputes: u64,
    _combinator: PhantomData<C>,
}

/// Factors combined with logical OR.
pub type OrFactors = Factors<AnyOf>;

/// Factors combined with logical AND.
pub type AndFactors = Factors<AllOf>;

impl<C: Combinator> Factors<C> {
    pub fn new() -> Self {
        Self {
            factors: HashMap::new(),
            result: C::IDENTITY,
            recomputes: 0,
            _combinator: PhantomData,
        }
    }

    /// Insert or update a factor and return the new combined result.
    pub fn set_value(&mut self, name: &str, value: bool) -> bool {
        let previous = self.factors.insert(name.to_string(), value);

        if previous.is_some() && value == C::IDENTITY {
            // The cached result may have been held only by this factor's old value.
            return self.recompute();
        }

        self.result = C::combine(self.result, value);
        self.result
    }

    /// Delete a factor and return the new combined result.
    ///
    /// Removing an absent factor leaves the result unchanged.
    pub fn remove_factor(&mut self, name: &str) -> bool {
        match self.factors.remove(name) {
            Some(previous) if previous != C::IDENTITY => self.recompute(),
            _ => self.result,
        }
    }

    /// Remove every factor and reset the result to the identity.
    pub fn clear_factors(&mut self) {
        self.factors.clear();
        self.result = C::IDENTITY;
    }

    /// Value of a factor, `false` when absent.
    pub fn get_value(&self, name: &str) -> bool {
        self.factors.get(name).copied().unwrap_or(false)
    }

    /// Value of a factor, `None` when absent.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.factors.get(name).copied()
    }

    pub fn has_factor(&self, name: &str) -> bool {
        self.factors.contains_key(name)
    }

    pub fn has_any_factor(&self) -> bool {
        !self.factors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Cached combined result.
    pub fn result(&self) -> bool {
        self.result
    }

    /// Combine all current factors from scratch without touching the cache.
    pub fn fold(&self) -> bool {
        self.factors
            .values()
            .fold(C::IDENTITY, |acc, &value| C::combine(acc, value))
    }

    /// Number of full recomputations performed so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    /// Iterate over `(name, value)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.factors.iter().map(|(name, &value)| (name.as_str(), value))
    }

    fn recompute(&mut self) -> bool {
        self.recomputes += 1;
        self.result = self.fold();
        self.result
    }
}

impl<C: Combinator> Default for Factors<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Combinator> Clone for Factors<C> {
    fn clone(&self) -> Self {
        Self {
            factors: self.factors.clone(),
            result: self.result,
            recomputes: self.recomputes,
            _combinator: PhantomData,
        }
    }
}

impl<C: Combinator> fmt::Debug for Factors<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factors")
            .field("combinator", &C::NAME)
            .field("result", &self.result)
            .field("factors", &self.factors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_factors_hold_identity() {
        assert!(!OrFactors::new().result());
        assert!(AndFactors::new().result());
    }

    #[test]
    fn test_or_clearing_true_factor_recomputes_to_false() {
        let mut or = OrFactors::new();
        assert!(or.set_value("x", true));
        assert!(!or.set_value("y", false));
        assert!(or.result());

        let recomputes = or.recompute_count();
        assert!(!or.set_value("x", false));
        assert_eq!(or.recompute_count(), recomputes + 1);
        assert!(!or.result());
    }

    #[test]
    fn test_or_clearing_one_of_two_true_factors_stays_true() {
        let mut or = OrFactors::new();
        or.set_value("x", true);
        or.set_value("y", true);
        assert!(or.set_value("x", false));
    }

    #[test]
    fn test_and_restoring_false_factor_recomputes_to_true() {
        let mut and = AndFactors::new();
        assert!(!and.set_value("x", false));

        let recomputes = and.recompute_count();
        assert!(and.set_value("x", true));
        assert_eq!(and.recompute_count(), recomputes + 1);
        assert!(and.result());
    }

    #[test]
    fn test_and_restoring_one_of_two_false_factors_stays_false() {
        let mut and = AndFactors::new();
        and.set_value("x", false);
        and.set_value("y", false);
        assert!(!and.set_value("x", true));
        assert!(and.set_value("y", true));
    }

    #[test]
    fn test_new_factors_take_fast_path() {
        let mut or = OrFactors::new();
        or.set_value("a", false);
        or.set_value("b", true);
        or.set_value("c", false);
        assert_eq!(or.recompute_count(), 0);
        assert!(or.result());

        let mut and = AndFactors::new();
        and.set_value("a", true);
        and.set_value("b", false);
        and.set_value("a", false);
        assert_eq!(and.recompute_count(), 0);
        assert!(!and.result());
    }

    #[test]
    fn test_or_remove_false_factor_is_fast() {
        let mut or = OrFactors::new();
        or.set_value("x", true);
        or.set_value("y", false);
        assert!(or.remove_factor("y"));
        assert_eq!(or.recompute_count(), 0);
    }

    #[test]
    fn test_or_remove_true_factor_recomputes() {
        let mut or = OrFactors::new();
        or.set_value("x", true);
        or.set_value("y", false);
        assert!(!or.remove_factor("x"));
        assert_eq!(or.recompute_count(), 1);
    }

    #[test]
    fn test_and_remove_only_false_factor_restores_true() {
        let mut and = AndFactors::new();
        and.set_value("x", true);
        and.set_value("y", false);
        assert!(and.remove_factor("y"));
        assert_eq!(and.recompute_count(), 1);
        assert!(and.remove_factor("x"));
        assert_eq!(and.recompute_count(), 1);
    }

    #[test]
    fn test_remove_absent_factor_is_noop() {
        let mut or = OrFactors::new();
        or.set_value("x", true);
        assert!(or.remove_factor("missing"));
        assert_eq!(or.len(), 1);
    }

    #[test]
    fn test_clear_factors_resets_to_identity() {
        let mut and = AndFactors::new();
        and.set_value("x", false);
        and.clear_factors();
        assert!(!and.has_any_factor());
        assert!(and.result());

        let mut or = OrFactors::new();
        or.set_value("x", true);
        or.clear_factors();
        assert!(!or.result());
    }

    #[test]
    fn test_get_value_defaults_to_false() {
        let and = AndFactors::new();
        assert!(!and.get_value("missing"));
        assert_eq!(and.get("missing"), None);
    }
}
