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

//! Type-erased access to concrete behavior types.

use std::any::Any;

/// Upcasts a value to [`Any`] so trait objects can be downcast to their
/// concrete type.
///
/// Implemented for every `'static` type, so behavior traits only have to name
/// it as a supertrait.
pub trait AsAny: Any {
    /// Returns `self` as a `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Returns `self` as a `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
