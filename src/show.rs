use itertools::Itertools;

/// Helper trait which can be used to display symbols, words and such.
pub trait Show {
    /// Returns a human readable representation of `self`. For a symbol this should be
    /// something short like `a` or `S`, for a word the concatenation of its symbols.
    /// This is mainly used for debugging and logging purposes.
    fn show(&self) -> String;
}

macro_rules! impl_show_to_string {
    ($($t:ty),*) => {
        $(
            impl Show for $t {
                fn show(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_show_to_string!(char, u8, u16, u32, u64, usize, i32, i64);

impl Show for bool {
    fn show(&self) -> String {
        match self {
            true => "+",
            false => "-",
        }
        .to_string()
    }
}

impl<S: Show> Show for [S] {
    fn show(&self) -> String {
        format!("\"{}\"", self.iter().map(|x| x.show()).join(""))
    }
}

impl<S: Show> Show for Vec<S> {
    fn show(&self) -> String {
        self.as_slice().show()
    }
}

impl<S: Show + ?Sized> Show for &S {
    fn show(&self) -> String {
        S::show(*self)
    }
}

impl<S: Show, T: Show> Show for (S, T) {
    fn show(&self) -> String {
        format!("({}, {})", self.0.show(), self.1.show())
    }
}
