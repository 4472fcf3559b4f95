/// Invoke a macro once for every tail of the given identifier list.
///
/// `for_each_tuple!(m !! A, B, C)` expands to `m!(A, B, C); m!(B, C); m!(C);`.
macro_rules! for_each_tuple {
    ($m:ident !! $head_ty:ident) => {
        $m!($head_ty);
    };
    ($m:ident !! $head_ty:ident, $($tail_ty:ident),*) => (
        $m!($head_ty, $( $tail_ty ),*);
        for_each_tuple!($m !! $( $tail_ty ),*);
    );
}

/// Apply a macro to every tuple arity from 1 to 15.
///
/// Bundles, query data and query filters are implemented for tuples through this.
macro_rules! all_tuples {
    ($m:ident) => {
        for_each_tuple!($m !! B0, B1, B2, B3, B4, B5, B6, B7, B8, B9, B10, B11, B12, B13, B14);
    };
}

#[cfg(test)]
mod tests {
    use std::marker::PhantomData;

    struct Arity<Params>(PhantomData<Params>);

    macro_rules! impl_arity {
         ($($name: ident),*) => {
            #[allow(dead_code)]
            impl<$($name),*> Arity<($($name,)*)> {
                fn arity(&self) -> usize {
                    [$(stringify!($name)),*].len()
                }
            }
        }
    }

    all_tuples!(impl_arity);

    #[test]
    fn every_arity_is_covered() {
        // Given
        let single = Arity::<(u8,)>(PhantomData);
        let widest = Arity::<(u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8)>(
            PhantomData,
        );

        // Then
        assert_eq!(single.arity(), 1);
        assert_eq!(widest.arity(), 15);
    }
}
