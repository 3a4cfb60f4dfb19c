/// Enter a span named `$name`; it closes when the returned guard drops.
///
/// `span!("decode")` is info level, `span!(debug, "decode_slots")` is debug level.
#[macro_export]
macro_rules! span {
    ($name:literal) => {
        $crate::tracing::info_span!($name).entered()
    };
    (debug, $name:literal) => {
        $crate::tracing::debug_span!($name).entered()
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_span_guards_nest() {
        let outer = span!("outer");
        {
            let _inner = span!(debug, "inner");
        }
        drop(outer);
    }
}
