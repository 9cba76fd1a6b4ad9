use crate::context::{RouteContext, RouteMapper, RouteType, RouteUnit};

/// Exactly one unit on `data_source`, every table keeping its name.
pub(crate) fn unicast(data_source: &str, tables: &[String]) -> RouteContext {
    RouteContext::with_units(
        RouteType::Unicast,
        vec![RouteUnit::new(
            RouteMapper::identity(data_source),
            tables.iter().map(|t| RouteMapper::identity(t)).collect(),
        )],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_unit() {
        let ctx = unicast("ds_0", &["t_user".to_string()]);
        assert!(ctx.is_single_unit());
        assert_eq!(ctx.units()[0].to_string(), "ds_0:[t_user]");
    }
}
