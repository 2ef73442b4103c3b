// Netverify: Symbolic Verification of Network Control Planes
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Symbolic values over a small finite domain.

use super::EncodingError;
use crate::network::{OspfType, Protocol};
use crate::smt::{Context, Expr};
use std::fmt::{Debug, Display};

/// Number of bits needed to distinguish `n` values
pub fn bits_for(n: usize) -> u32 {
    let mut w = 1;
    while (1usize << w) < n {
        w += 1;
    }
    w
}

/// Symbolic value ranging over a finite domain. The value is stored as a bit-vector index into
/// the domain. If the domain has a single element, the index is the constant `0` and no variable
/// is allocated.
#[derive(Debug, Clone)]
pub struct SymbolicEnum<T> {
    name: String,
    domain: Vec<T>,
    width: u32,
    bitvec: Expr,
}

impl<T: Clone + PartialEq + Debug + Display> SymbolicEnum<T> {
    /// Allocate a new enum variable. Indices outside of the domain are excluded by an assertion.
    pub fn new(ctx: &mut Context, name: impl Into<String>, domain: Vec<T>) -> Self {
        let name = name.into();
        let width = bits_for(domain.len());
        let bitvec = if domain.len() <= 1 {
            Expr::bv(0, width)
        } else {
            let v = ctx.mk_bv_var(name.clone(), width);
            if domain.len() < (1usize << width) {
                ctx.add(v.bvule(&Expr::bv(domain.len() as u64 - 1, width)));
            }
            v
        };
        Self { name, domain, width, bitvec }
    }

    /// Enum with a constant value
    pub fn constant(domain: Vec<T>, value: &T) -> Result<Self, EncodingError> {
        let width = bits_for(domain.len());
        let idx = index_of(&domain, value, "constant")?;
        Ok(Self { name: format!("{}", value), bitvec: Expr::bv(idx as u64, width), domain, width })
    }

    /// Name of the underlying variable
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The domain
    pub fn domain(&self) -> &[T] {
        &self.domain
    }

    /// Width of the bit-vector
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Current bit-vector term
    pub fn bitvec(&self) -> &Expr {
        &self.bitvec
    }

    /// Replace the bit-vector term. Used by the transfer function to thread new values.
    pub fn set_bitvec(&mut self, e: Expr) {
        self.bitvec = e;
    }

    /// Term representing the domain element `v`
    pub fn value_expr(&self, v: &T) -> Result<Expr, EncodingError> {
        let idx = index_of(&self.domain, v, &self.name)?;
        Ok(Expr::bv(idx as u64, self.width))
    }

    /// Formula testing whether the enum has the value `v`
    pub fn check_if_value(&self, v: &T) -> Result<Expr, EncodingError> {
        Ok(self.bitvec.equals(&self.value_expr(v)?))
    }

    /// Formula testing whether the enum has its first (default) value
    pub fn is_default(&self) -> Expr {
        self.bitvec.equals(&Expr::bv(0, self.width))
    }

    /// Decode an index read from a model
    pub fn value(&self, idx: u64) -> Option<&T> {
        self.domain.get(idx as usize)
    }

    /// Equality of two enums. Enums over different domains are compared value by value.
    pub fn mk_eq(&self, other: &SymbolicEnum<T>) -> Expr {
        if self.domain == other.domain {
            return self.bitvec.equals(&other.bitvec);
        }
        let mut cases = Vec::new();
        for v in self.domain.iter() {
            if let (Ok(a), Ok(b)) = (self.check_if_value(v), other.check_if_value(v)) {
                cases.push(a.and(&b));
            }
        }
        Expr::or_all(cases)
    }
}

fn index_of<T: PartialEq + Display>(domain: &[T], v: &T, name: &str) -> Result<usize, EncodingError> {
    domain
        .iter()
        .position(|x| x == v)
        .ok_or_else(|| EncodingError::UnknownEnumValue(v.to_string(), name.to_string()))
}

/// Protocol that produced a route
pub type SymbolicHistory = SymbolicEnum<Protocol>;

/// OSPF area of a route
pub type SymbolicArea = SymbolicEnum<u64>;

/// Route-reflector client a route was learned from. The value `0` means the route was not
/// learned from a client.
pub type SymbolicOriginatorId = SymbolicEnum<u64>;

/// OSPF route type
pub type SymbolicOspfType = SymbolicEnum<OspfType>;

impl SymbolicEnum<OspfType> {
    /// OSPF type variable over all four types
    pub fn ospf_type(ctx: &mut Context, name: impl Into<String>) -> Self {
        Self::new(ctx, name, OspfType::ALL.to_vec())
    }

    /// Constant OSPF type
    pub fn ospf_type_constant(t: OspfType) -> Self {
        let idx = OspfType::ALL.iter().position(|x| *x == t).unwrap_or(0);
        Self {
            name: t.to_string(),
            domain: OspfType::ALL.to_vec(),
            width: 2,
            bitvec: Expr::bv(idx as u64, 2),
        }
    }

    /// Intra-area or inter-area route
    pub fn is_internal(&self) -> Expr {
        self.bitvec.bvule(&Expr::bv(1, self.width))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::smt::{Model, Value};

    #[test]
    fn widths() {
        assert_eq!(bits_for(1), 1);
        assert_eq!(bits_for(2), 1);
        assert_eq!(bits_for(3), 2);
        assert_eq!(bits_for(4), 2);
        assert_eq!(bits_for(5), 3);
    }

    #[test]
    fn singleton_is_constant() {
        let mut ctx = Context::new();
        let e = SymbolicEnum::new(&mut ctx, "h", vec![Protocol::Bgp]);
        assert_eq!(ctx.num_variables(), 0);
        assert!(e.check_if_value(&Protocol::Bgp).unwrap().is_true());
        assert!(e.check_if_value(&Protocol::Ospf).is_err());
    }

    #[test]
    fn bounded_domain() {
        let mut ctx = Context::new();
        let e = SymbolicEnum::new(&mut ctx, "h", vec![Protocol::Connected, Protocol::Static, Protocol::Bgp]);
        assert_eq!(e.width(), 2);
        // index 3 is excluded
        assert_eq!(ctx.num_constraints(), 1);
        let mut m = Model::new();
        m.set("h", Value::BitVec(2));
        assert!(m.eval_bool(&e.check_if_value(&Protocol::Bgp).unwrap()).unwrap());
        assert_eq!(e.value(2), Some(&Protocol::Bgp));
    }

    #[test]
    fn compare_different_domains() {
        let mut ctx = Context::new();
        let a = SymbolicEnum::new(&mut ctx, "a", vec![Protocol::Static, Protocol::Bgp]);
        let b = SymbolicEnum::new(&mut ctx, "b", vec![Protocol::Bgp, Protocol::Ospf]);
        let mut m = Model::new();
        m.set("a", Value::BitVec(1)).set("b", Value::BitVec(0));
        assert!(m.eval_bool(&a.mk_eq(&b)).unwrap());
        m.set("b", Value::BitVec(1));
        assert!(!m.eval_bool(&a.mk_eq(&b)).unwrap());
    }

    #[test]
    fn ospf_internal() {
        let m = Model::new();
        let t = SymbolicEnum::ospf_type_constant(OspfType::OIA);
        assert!(m.eval_bool(&t.is_internal()).unwrap());
        let t = SymbolicEnum::ospf_type_constant(OspfType::E1);
        assert!(!m.eval_bool(&t.is_internal()).unwrap());
    }
}
