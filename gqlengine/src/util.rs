use std::borrow::Cow;

/// Converts a native `snake_case` identifier into the `camelCase` GraphQL field name.
pub(crate) fn to_camel_case(s: &'_ str) -> Cow<'_, str> {
    let mut dest = Cow::Borrowed(s);

    // handle '_' to be more friendly with the
    // _var convention for unused variables
    let s_iter = s.strip_prefix('_').unwrap_or(s).split('_').enumerate();

    for (i, part) in s_iter {
        if i == 0 {
            dest = Cow::Borrowed(part);
            continue;
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            dest += Cow::Owned(first.to_uppercase().collect::<String>());
            dest += chars.as_str();
        }
    }

    dest
}

/// Extracts a human-readable message out of a recovered panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).into()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
