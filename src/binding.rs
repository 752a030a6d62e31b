//! Mapper binding.
//!
//! A mapper is a struct of typed function slots, one per statement of its
//! namespace. The struct name is the namespace and each field name is a
//! statement id:
//!
//! ```rust,ignore
//! sqlweave::mapper! {
//!     pub struct UserMapper {
//!         pub find: fn(Context) -> Result<User, MapperError>,
//!         pub remove: fn(Context) -> Result<u64, MapperError>,
//!     }
//! }
//!
//! let mut users = UserMapper::default();
//! weave.bind(&mut users)?;
//! let user = users.find.call(Context::new().with("id", 7)).await?;
//! ```
//!
//! Binding checks every slot's signature against the mapper contract (one
//! input; the failure signal last) before installing anything. Slots are
//! callable as `fn(A) -> Result<T, E>`; the data output `T` is marshaled from
//! the row set and `E` carries the failure.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::SqlWeave;
use crate::error::{MapperError, MapperResult};
use crate::marshal::{FromRow, FromRows, Row};
use crate::value::Value;

/// One position in a function's output list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A data value, named by its type.
    Data(&'static str),
    /// The failure signal.
    Failure,
}

/// Input arity and output shapes of a mapper function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDescriptor {
    pub inputs: usize,
    pub outputs: Vec<Shape>,
}

impl SignatureDescriptor {
    /// Check the mapper contract.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.inputs != 1 {
            return Err("there can only be one argument");
        }
        match self.outputs.as_slice() {
            [] => Err("at least one return value is required"),
            [single] if *single != Shape::Failure => Err("a single return value must be the failure signal"),
            [_, _, _, ..] if self.outputs.last() != Some(&Shape::Failure) => {
                Err("the last return value must be the failure signal")
            }
            _ => Ok(()),
        }
    }
}

/// Types usable as a mapper function's return type.
///
/// Only `Result<T, E>` passes validation and can be called; the other
/// implementations let binding report the contract violation instead of
/// failing to compile.
pub trait Returns {
    fn shapes() -> Vec<Shape>;
}

impl Returns for () {
    fn shapes() -> Vec<Shape> {
        Vec::new()
    }
}

impl<T: FromRows, E: From<MapperError>> Returns for Result<T, E> {
    fn shapes() -> Vec<Shape> {
        if T::EMPTY {
            vec![Shape::Failure]
        } else {
            vec![Shape::Data(std::any::type_name::<T>()), Shape::Failure]
        }
    }
}

macro_rules! data_returns {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Returns for $ty {
                fn shapes() -> Vec<Shape> {
                    vec![Shape::Data(std::any::type_name::<$ty>())]
                }
            }
        )+
    };
}

data_returns!(i64, i32, u64, f64, bool, String, Value, Row);

impl<T: FromRow> Returns for Vec<T> {
    fn shapes() -> Vec<Shape> {
        vec![Shape::Data(std::any::type_name::<Self>())]
    }
}

impl<T: FromRow> Returns for Option<T> {
    fn shapes() -> Vec<Shape> {
        vec![Shape::Data(std::any::type_name::<Self>())]
    }
}

/// Function pointer types that can describe themselves.
pub trait Signature {
    fn descriptor() -> SignatureDescriptor;
}

impl<R: Returns> Signature for fn() -> R {
    fn descriptor() -> SignatureDescriptor {
        SignatureDescriptor {
            inputs: 0,
            outputs: R::shapes(),
        }
    }
}

impl<A: Serialize, R: Returns> Signature for fn(A) -> R {
    fn descriptor() -> SignatureDescriptor {
        SignatureDescriptor {
            inputs: 1,
            outputs: R::shapes(),
        }
    }
}

impl<A, B, R: Returns> Signature for fn(A, B) -> R {
    fn descriptor() -> SignatureDescriptor {
        SignatureDescriptor {
            inputs: 2,
            outputs: R::shapes(),
        }
    }
}

impl<A, B, C, R: Returns> Signature for fn(A, B, C) -> R {
    fn descriptor() -> SignatureDescriptor {
        SignatureDescriptor {
            inputs: 3,
            outputs: R::shapes(),
        }
    }
}

/// Where a bound function sends its calls.
#[derive(Clone)]
pub struct Binding {
    weave: SqlWeave,
    namespace: &'static str,
    id: &'static str,
}

impl Binding {
    pub(crate) fn new(weave: SqlWeave, namespace: &'static str, id: &'static str) -> Self {
        Self { weave, namespace, id }
    }

    /// `Namespace.id` of the bound statement.
    pub fn statement(&self) -> String {
        format!("{}.{}", self.namespace, self.id)
    }
}

/// A typed function slot, filled in by [`SqlWeave::bind`].
pub struct MapperFn<F> {
    binding: Option<Binding>,
    _signature: PhantomData<F>,
}

impl<F> Default for MapperFn<F> {
    fn default() -> Self {
        Self {
            binding: None,
            _signature: PhantomData,
        }
    }
}

impl<F> fmt::Debug for MapperFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(binding) => write!(f, "MapperFn({})", binding.statement()),
            None => write!(f, "MapperFn(unbound)"),
        }
    }
}

impl<F> MapperFn<F> {
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// `Namespace.id` this slot is bound to.
    pub fn statement(&self) -> Option<String> {
        self.binding.as_ref().map(Binding::statement)
    }
}

impl<A, T, E> MapperFn<fn(A) -> Result<T, E>>
where
    A: Serialize,
    T: FromRows,
    E: From<MapperError>,
{
    /// Render and run the bound statement with `arg` as its context, then
    /// convert the rows into `T`.
    pub async fn call(&self, arg: A) -> Result<T, E> {
        let binding = self
            .binding
            .as_ref()
            .ok_or_else(|| MapperError::Binding("mapper function is not bound".to_string()))?;
        let rows = binding.weave.invoke(binding.namespace, binding.id, &arg).await?;
        Ok(T::from_rows(rows).map_err(|e| binding.weave.wrap(binding.namespace, binding.id, e))?)
    }
}

/// Type-erased view of a [`MapperFn`] slot.
pub trait Bindable {
    fn descriptor(&self) -> SignatureDescriptor;
    fn install(&mut self, binding: Binding);
    fn is_bound(&self) -> bool;
}

impl<F: Signature> Bindable for MapperFn<F> {
    fn descriptor(&self) -> SignatureDescriptor {
        F::descriptor()
    }

    fn install(&mut self, binding: Binding) {
        self.binding = Some(binding);
    }

    fn is_bound(&self) -> bool {
        self.binding.is_some()
    }
}

/// A struct of [`MapperFn`] slots. Implemented by [`mapper!`](crate::mapper).
pub trait Mapper {
    /// Namespace the slots resolve in.
    const NAMESPACE: &'static str;

    /// Every slot with its field name, in declaration order.
    fn functions(&mut self) -> Vec<(&'static str, &mut dyn Bindable)>;
}

/// Declare a mapper struct whose fields are [`MapperFn`] slots.
///
/// Each field is written with its function pointer type; the struct name
/// becomes the namespace and each field name the statement id.
#[macro_export]
macro_rules! mapper {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $signature:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $crate::binding::MapperFn<$signature>,
            )*
        }

        impl $crate::binding::Mapper for $name {
            const NAMESPACE: &'static str = stringify!($name);

            fn functions(&mut self) -> ::std::vec::Vec<(&'static str, &mut dyn $crate::binding::Bindable)> {
                ::std::vec![
                    $(
                        (stringify!($field), &mut self.$field as &mut dyn $crate::binding::Bindable),
                    )*
                ]
            }
        }
    };
}

/// Validate every slot of `mapper`, then install bindings. Nothing is
/// installed when any slot breaks the contract.
pub(crate) fn bind_all<M: Mapper>(weave: &SqlWeave, mapper: &mut M) -> MapperResult<usize> {
    let namespace = M::NAMESPACE;
    let mut functions = mapper.functions();

    for (name, function) in &functions {
        function
            .descriptor()
            .validate()
            .map_err(|reason| MapperError::Binding(format!("{}.{}: {}", namespace, name, reason)))?;
    }

    for (name, function) in functions.iter_mut() {
        let id: &'static str = *name;
        if weave.registry().lookup(namespace, id).is_err() {
            warn!(namespace, id, "no statement defined for mapper function");
        }
        function.install(Binding::new(weave.clone(), namespace, id));
        info!(statement = %format!("{}.{}", namespace, id), "bound mapper function");
    }
    Ok(functions.len())
}
