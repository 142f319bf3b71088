/// Implements [`Record`](crate::storage::Record) for structs carrying a `pub id: String` field.
///
/// # Example
/// ```ignore
/// impl_record!(StaffMember, Announcement);
/// ```
/// expands to one `impl Record for ... { fn id(&self) -> &str { &self.id } }`
/// per listed type.
#[macro_export]
macro_rules! impl_record {
    ($($record:ty),* $(,)?) => {
        $(
            impl $crate::storage::Record for $record {
                fn id(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

/// Applies every `Some` field of a patch onto the matching field of a record.
///
/// Plain fields are assigned as-is; fields listed after `optional:` are
/// `Option` on the record and get wrapped in `Some`.
#[macro_export]
macro_rules! apply_patch {
    ($target:expr, $patch:expr; $($field:ident),* ; optional: $($opt:ident),* $(,)?) => {
        $crate::apply_patch!($target, $patch; $($field),*);
        $(
            if let Some(value) = $patch.$opt {
                $target.$opt = Some(value);
            }
        )*
    };
    ($target:expr, $patch:expr; $($field:ident),* $(,)?) => {
        $(
            if let Some(value) = $patch.$field {
                $target.$field = value;
            }
        )*
    };
}
