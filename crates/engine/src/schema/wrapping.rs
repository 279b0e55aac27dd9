/// List and non-null wrapping around a named type, stored compactly: one bit
/// per list layer plus one for the named type itself. Bit 0 of
/// `required_layers` is the innermost list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Wrapping {
    inner_is_required: bool,
    list_length: u8,
    required_layers: u16,
}

impl Wrapping {
    pub fn nullable() -> Self {
        Self::default()
    }

    pub fn required() -> Self {
        Wrapping {
            inner_is_required: true,
            ..Default::default()
        }
    }

    /// Wraps the current type in a nullable list.
    #[must_use]
    pub fn wrap_list(mut self) -> Self {
        debug_assert!(self.list_length < 16, "list nesting too deep");
        self.list_length += 1;
        self
    }

    /// Marks the outermost wrapper (the named type if there is no list) as
    /// non-null.
    #[must_use]
    pub fn require_outermost(mut self) -> Self {
        if self.list_length == 0 {
            self.inner_is_required = true;
        } else {
            self.required_layers |= 1 << (self.list_length - 1);
        }
        self
    }

    pub fn is_list(self) -> bool {
        self.list_length > 0
    }

    /// Whether the outermost wrapper rejects null.
    pub fn is_required(self) -> bool {
        if self.list_length == 0 {
            self.inner_is_required
        } else {
            self.required_layers & (1 << (self.list_length - 1)) != 0
        }
    }

    /// Strips the outermost list layer, yielding the element wrapping.
    #[must_use]
    pub fn unwrap_list(mut self) -> Self {
        debug_assert!(self.list_length > 0);
        self.list_length -= 1;
        self.required_layers &= !(1 << self.list_length);
        self
    }

    /// Renders `name` with the wrapping applied, e.g. `[User!]!`.
    pub fn type_display(self, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 3 * self.list_length as usize + 1);
        for _ in 0..self.list_length {
            out.push('[');
        }
        out.push_str(name);
        if self.inner_is_required {
            out.push('!');
        }
        for layer in 0..self.list_length {
            out.push(']');
            if self.required_layers & (1 << layer) != 0 {
                out.push('!');
            }
        }
        out
    }
}

impl std::fmt::Debug for Wrapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.type_display("_"))
    }
}
