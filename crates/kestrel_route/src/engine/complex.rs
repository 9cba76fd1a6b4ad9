//! Complex routing: independently sharded tables in one statement.
//!
//! Each table (or binding group) is routed on its own, then units are
//! combined pairwise, keeping only combinations on the same data source.

use kestrel_common::error::{KestrelResult, RouteError};

use crate::context::{RouteContext, RouteType, RouteUnit};

pub(crate) fn combine(routed: Vec<RouteContext>) -> KestrelResult<RouteContext> {
    let mut combined: Option<Vec<RouteUnit>> = None;
    for ctx in routed {
        combined = Some(match combined {
            None => ctx.units().to_vec(),
            Some(acc) => {
                let mut next = Vec::new();
                for left in &acc {
                    for right in ctx.units() {
                        if left.data_source.logic_name != right.data_source.logic_name {
                            continue;
                        }
                        let mut tables = left.tables.clone();
                        tables.extend(right.tables.iter().cloned());
                        next.push(RouteUnit::new(left.data_source.clone(), tables));
                    }
                }
                next
            }
        });
    }
    let units = combined.unwrap_or_default();
    if units.is_empty() {
        return Err(RouteError::Unsupported(
            "tables of the statement share no data source; cross data source joins are not supported"
                .into(),
        )
        .into());
    }
    Ok(RouteContext::with_units(RouteType::Complex, units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RouteMapper;

    fn ctx(units: &[(&str, &str, &str)]) -> RouteContext {
        RouteContext::with_units(
            RouteType::Standard,
            units
                .iter()
                .map(|(ds, logic, actual)| {
                    RouteUnit::new(RouteMapper::identity(ds), vec![RouteMapper::new(*logic, *actual)])
                })
                .collect(),
        )
    }

    #[test]
    fn test_cross_product_restricted_to_data_source() {
        let orders = ctx(&[("ds_0", "t_order", "t_order_0"), ("ds_1", "t_order", "t_order_1")]);
        let users = ctx(&[
            ("ds_0", "t_user", "t_user_0"),
            ("ds_0", "t_user", "t_user_1"),
            ("ds_1", "t_user", "t_user_2"),
        ]);
        let combined = combine(vec![orders, users]).unwrap();
        let units: Vec<String> = combined.units().iter().map(ToString::to_string).collect();
        assert_eq!(
            units,
            vec![
                "ds_0:[t_order_0, t_user_0]",
                "ds_0:[t_order_0, t_user_1]",
                "ds_1:[t_order_1, t_user_2]"
            ]
        );
        assert_eq!(combined.route_type(), RouteType::Complex);
    }

    #[test]
    fn test_disjoint_data_sources_rejected() {
        let a = ctx(&[("ds_0", "a", "a_0")]);
        let b = ctx(&[("ds_1", "b", "b_0")]);
        assert!(combine(vec![a, b]).unwrap_err().is_user_error());
    }
}
