//! Native functions bound as resolvers.

use std::future::Future;

use futures::future::BoxFuture;

use crate::{
    FieldError,
    reflect::{DecodeError, Dynamic, NativeType, Reflect},
};

/// Native `async` function which may be bound as a resolver.
///
/// Implemented for closures and functions of up to 6 parameters, each implementing [`Reflect`],
/// returning a future whose output implements [`Returns`]. The `Args` parameter only
/// distinguishes the arities.
pub trait Handler<Args>: Clone + Send + Sync + 'static {
    /// Output of the returned future.
    type Output: Returns;

    /// Returns the shapes of the parameters, in order.
    fn params() -> Vec<NativeType>;

    /// Decodes the `args` and calls this function.
    ///
    /// # Errors
    ///
    /// If any of the `args` doesn't decode into its parameter type.
    fn invoke(&self, args: Vec<Dynamic>) -> Result<BoxFuture<'static, Self::Output>, DecodeError>;
}

macro_rules! impl_handler {
    ($($ty:ident $arg:ident),*) => {
        impl<F, Fut, R, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: Returns,
            $($ty: Reflect,)*
        {
            type Output = R;

            fn params() -> Vec<NativeType> {
                vec![$($ty::native()),*]
            }

            fn invoke(&self, args: Vec<Dynamic>) -> Result<BoxFuture<'static, R>, DecodeError> {
                let _args = &mut args.into_iter();
                $(let $arg = $ty::from_dynamic(_args.next().unwrap_or_default())?;)*
                Ok(Box::pin(self($($arg),*)))
            }
        }
    };
}

impl_handler!();
impl_handler!(A1 a1);
impl_handler!(A1 a1, A2 a2);
impl_handler!(A1 a1, A2 a2, A3 a3);
impl_handler!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_handler!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_handler!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);

/// Successful output of a [`Handler`]: nothing, a single value, or a tuple of 2 or 3 values.
pub trait Outputs: Send + 'static {
    /// Returns the shapes of the returned values, in order.
    fn slots() -> Vec<NativeType>;

    /// Converts the returned values into their [`Dynamic`] representation.
    fn into_slots(self) -> Vec<Dynamic>;
}

impl Outputs for () {
    fn slots() -> Vec<NativeType> {
        vec![]
    }

    fn into_slots(self) -> Vec<Dynamic> {
        vec![]
    }
}

impl<T: Reflect> Outputs for T {
    fn slots() -> Vec<NativeType> {
        vec![T::native()]
    }

    fn into_slots(self) -> Vec<Dynamic> {
        vec![self.into_dynamic()]
    }
}

impl<A: Reflect, B: Reflect> Outputs for (A, B) {
    fn slots() -> Vec<NativeType> {
        vec![A::native(), B::native()]
    }

    fn into_slots(self) -> Vec<Dynamic> {
        vec![self.0.into_dynamic(), self.1.into_dynamic()]
    }
}

impl<A: Reflect, B: Reflect, C: Reflect> Outputs for (A, B, C) {
    fn slots() -> Vec<NativeType> {
        vec![A::native(), B::native(), C::native()]
    }

    fn into_slots(self) -> Vec<Dynamic> {
        vec![
            self.0.into_dynamic(),
            self.1.into_dynamic(),
            self.2.into_dynamic(),
        ]
    }
}

/// Output of a [`Handler`]'s future: [`Outputs`], or a [`Result`] of them whose error converts
/// into a [`FieldError`].
pub trait Returns: Send + 'static {
    /// Returns the shapes of the successfully returned values, in order.
    fn slots() -> Vec<NativeType>;

    /// Indicates whether an error may be returned.
    fn fallible() -> bool;

    /// Converts the returned values into their [`Dynamic`] representation.
    ///
    /// # Errors
    ///
    /// If the handler returned an error.
    fn into_slots(self) -> Result<Vec<Dynamic>, FieldError>;
}

impl<O: Outputs> Returns for O {
    fn slots() -> Vec<NativeType> {
        O::slots()
    }

    fn fallible() -> bool {
        false
    }

    fn into_slots(self) -> Result<Vec<Dynamic>, FieldError> {
        Ok(Outputs::into_slots(self))
    }
}

impl<O, E> Returns for Result<O, E>
where
    O: Outputs,
    E: Into<FieldError> + Send + 'static,
{
    fn slots() -> Vec<NativeType> {
        O::slots()
    }

    fn fallible() -> bool {
        true
    }

    fn into_slots(self) -> Result<Vec<Dynamic>, FieldError> {
        self.map(Outputs::into_slots).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt as _;

    use super::*;
    use crate::FieldResult;

    fn params_of<H: Handler<A>, A>(_: &H) -> Vec<NativeType> {
        H::params()
    }

    fn slots_of<H: Handler<A>, A>(_: &H) -> (Vec<NativeType>, bool) {
        (
            <H::Output as Returns>::slots(),
            <H::Output as Returns>::fallible(),
        )
    }

    #[test]
    fn describes_signatures() {
        let h = |id: i32, name: Option<String>| async move { (id, name) };
        assert_eq!(params_of(&h), [i32::native(), Option::<String>::native()]);
        assert_eq!(
            slots_of(&h),
            (vec![i32::native(), Option::<String>::native()], false),
        );

        let h = || async { FieldResult::Ok(()) };
        assert_eq!(params_of(&h), Vec::<NativeType>::new());
        assert_eq!(slots_of(&h), (vec![], true));
    }

    #[test]
    fn calls_with_weakly_decoded_arguments() {
        let h = |a: i32, b: i32| async move { a + b };
        let out = h
            .invoke(vec![Dynamic::String("40".into()), Dynamic::Int(2)])
            .unwrap()
            .now_or_never()
            .unwrap();
        assert_eq!(out, 42);

        assert!(h.invoke(vec![Dynamic::String("x".into())]).is_err());
    }

    #[test]
    fn routes_errors() {
        let h = |fail: bool| async move {
            if fail { Err("denied") } else { Ok(String::from("ok")) }
        };
        let ok = h.invoke(vec![Dynamic::Bool(false)]).unwrap().now_or_never().unwrap();
        assert!(matches!(
            Returns::into_slots(ok).as_deref(),
            Ok([Dynamic::String(s)]) if s == "ok",
        ));

        let err = h.invoke(vec![Dynamic::Bool(true)]).unwrap().now_or_never().unwrap();
        assert_eq!(
            Returns::into_slots(err).unwrap_err().message(),
            "denied",
        );
    }
}
