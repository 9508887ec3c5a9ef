// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A macro declaring small, copyable flag sets.

/// Declares a flag-set newtype over an unsigned integer.
///
/// ```
/// tessera_core::tessera_bitflags! {
///     /// Which frame events a behavior wants.
///     pub struct Wants: u8 {
///         const UPDATE = 1 << 0;
///         const LATE_UPDATE = 1 << 1;
///     }
/// }
/// let both = Wants::UPDATE | Wants::LATE_UPDATE;
/// assert!(both.contains(Wants::UPDATE));
/// ```
#[macro_export]
macro_rules! tessera_bitflags {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident: $ty:ty {
            $(
                $(#[$flag_attr:meta])*
                const $flag_name:ident = $flag_value:expr;
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name {
            bits: $ty,
        }

        impl $name {
            /// No flag set.
            pub const EMPTY: Self = Self { bits: 0 };

            $(
                $(#[$flag_attr])*
                pub const $flag_name: Self = Self { bits: $flag_value };
            )*

            /// Builds a set from raw bits, keeping unknown bits.
            pub const fn from_bits_retain(bits: $ty) -> Self {
                Self { bits }
            }

            /// The raw bits.
            pub const fn bits(&self) -> $ty {
                self.bits
            }

            /// Returns `true` if no flag is set.
            pub const fn is_empty(&self) -> bool {
                self.bits == 0
            }

            /// Returns `true` if every flag of `other` is set.
            pub const fn contains(&self, other: Self) -> bool {
                (self.bits & other.bits) == other.bits
            }

            /// Returns `true` if any flag of `other` is set.
            pub const fn intersects(&self, other: Self) -> bool {
                (self.bits & other.bits) != 0
            }

            /// Sets the flags of `other`.
            pub fn insert(&mut self, other: Self) {
                self.bits |= other.bits;
            }

            /// Clears the flags of `other`.
            pub fn remove(&mut self, other: Self) {
                self.bits &= !other.bits;
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, other: Self) -> Self {
                Self { bits: self.bits | other.bits }
            }
        }

        impl core::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, other: Self) -> Self {
                Self { bits: self.bits & other.bits }
            }
        }

        impl core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, other: Self) {
                self.bits |= other.bits;
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let mut rest = self.bits;
                let mut names = f.debug_set();
                $(
                    if $flag_value != 0 && (rest & $flag_value) == $flag_value {
                        names.entry(&format_args!("{}", stringify!($flag_name)));
                        rest &= !$flag_value;
                    }
                )*
                if rest != 0 {
                    names.entry(&format_args!("{:#x}", rest));
                }
                names.finish()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::tessera_bitflags;

    tessera_bitflags! {
        /// Flags used to exercise the macro.
        pub struct Phases: u8 {
            const INIT = 1 << 0;
            const TICK = 1 << 1;
            const SHUT = 1 << 2;
        }
    }

    #[test]
    fn test_set_operations() {
        let mut phases = Phases::INIT | Phases::TICK;
        assert!(phases.contains(Phases::INIT));
        assert!(!phases.contains(Phases::INIT | Phases::SHUT));
        assert!(phases.intersects(Phases::TICK | Phases::SHUT));

        phases.remove(Phases::INIT);
        assert_eq!(phases, Phases::TICK);
        phases.insert(Phases::SHUT);
        assert_eq!(phases.bits(), 0b110);
        assert!(Phases::default().is_empty());
        assert_eq!(phases & Phases::SHUT, Phases::SHUT);
    }

    #[test]
    fn test_debug_lists_names_and_unknown_bits() {
        assert_eq!(format!("{:?}", Phases::INIT | Phases::SHUT), "{INIT, SHUT}");
        assert_eq!(format!("{:?}", Phases::from_bits_retain(0b1000_0010)), "{TICK, 0x80}");
        assert_eq!(format!("{:?}", Phases::EMPTY), "{}");
    }
}
