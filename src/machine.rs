//! Machine model: type sizes and integer ranges.

use num_bigint::BigInt;
use num_traits::One;

use crate::bound::Interval;
use crate::cfa::{BasicType, CType, SimpleType};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum MachineModel {
    Linux32,
    #[default]
    Linux64,
}

impl MachineModel {
    /// Size of a type in bytes, `None` for types without a size (void, incomplete structs).
    pub fn size_of(self, ty: &CType) -> Option<usize> {
        match ty {
            CType::Simple(s) => Some(self.size_of_simple(*s)),
            CType::Pointer(_) => Some(self.pointer_size()),
            CType::Array(inner, Some(n)) => self.size_of(inner).map(|size| size * n),
            CType::Array(_, None) | CType::Composite(_) | CType::Void => None,
        }
    }

    pub fn pointer_size(self) -> usize {
        match self {
            MachineModel::Linux32 => 4,
            MachineModel::Linux64 => 8,
        }
    }

    pub fn size_of_simple(self, ty: SimpleType) -> usize {
        match ty.basic {
            BasicType::Bool | BasicType::Char => 1,
            BasicType::Short => 2,
            BasicType::Int | BasicType::Float => 4,
            BasicType::Long => self.pointer_size(),
            BasicType::LongLong | BasicType::Double => 8,
            BasicType::LongDouble => match self {
                MachineModel::Linux32 => 12,
                MachineModel::Linux64 => 16,
            },
        }
    }

    /// Range of values representable by an integer type.
    ///
    /// Floating types yield the unbounded interval.
    pub fn range(self, ty: SimpleType) -> Interval {
        if ty.basic.is_floating() {
            return Interval::top();
        }
        if ty.basic == BasicType::Bool {
            return Interval::range(0, 1);
        }
        let bits = 8 * self.size_of_simple(ty);
        if ty.signed {
            let half = BigInt::one() << (bits - 1);
            Interval::range(-&half, half - 1)
        } else {
            Interval::range(0, (BigInt::one() << bits) - 1)
        }
    }

    pub fn unsigned_int_max(self) -> BigInt {
        (BigInt::one() << (8 * self.size_of_simple(SimpleType { basic: BasicType::Int, signed: false }))) - 1
    }
}
