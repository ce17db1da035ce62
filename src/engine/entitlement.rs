//! Entitlement matcher.
//!
//! Three association axes, each enforced only when the license actually has
//! entities attached on that axis: customers, products, and (behind a
//! deployment flag) published releases of the matched product. Strict mode
//! makes the request identifier mandatory on an enforced axis; in lenient
//! mode a supplied identifier must still match.

use crate::engine::outcome::Outcome;
use crate::model::{Customer, ProductWithReleases, Release};

/// Match the customer axis.
///
/// Returns the matched customer id, `None` when the axis is unrestricted
/// or no identifier was supplied.
pub fn match_customer(
    customers: &[Customer],
    strict: bool,
    requested: Option<&str>,
) -> Result<Option<String>, Outcome> {
    // A license with no attached customers is unrestricted on this axis.
    if customers.is_empty() {
        return Ok(None);
    }

    match requested {
        None if strict => Err(Outcome::CustomerNotFound),
        None => Ok(None),
        Some(id) => customers
            .iter()
            .find(|customer| customer.id == id)
            .map(|customer| Some(customer.id.clone()))
            .ok_or(Outcome::CustomerNotFound),
    }
}

/// Match the product axis.
///
/// Returns the matched product (with its release projection) so the release
/// axis can be evaluated against it.
pub fn match_product<'a>(
    products: &'a [ProductWithReleases],
    strict: bool,
    requested: Option<&str>,
) -> Result<Option<&'a ProductWithReleases>, Outcome> {
    if products.is_empty() {
        return Ok(None);
    }

    match requested {
        None if strict => Err(Outcome::ProductNotFound),
        None => Ok(None),
        Some(id) => products
            .iter()
            .find(|entry| entry.product.id == id)
            .map(Some)
            .ok_or(Outcome::ProductNotFound),
    }
}

/// Match the release/version axis against the matched product.
///
/// Only evaluated when the axis is enabled for this deployment and a
/// product matched. A product with no published releases is unrestricted.
pub fn match_release<'a>(
    matched_product: Option<&'a ProductWithReleases>,
    strict: bool,
    enabled: bool,
    version: Option<&str>,
) -> Result<Option<&'a Release>, Outcome> {
    if !enabled {
        return Ok(None);
    }

    let Some(product) = matched_product else {
        return Ok(None);
    };

    let published: Vec<&Release> = product
        .releases
        .iter()
        .filter(|release| release.is_published())
        .collect();

    if published.is_empty() {
        return Ok(None);
    }

    match version {
        None if strict => Err(Outcome::ReleaseNotFound),
        None => Ok(None),
        Some(version) => published
            .into_iter()
            .find(|release| release.version == version)
            .map(Some)
            .ok_or(Outcome::ReleaseNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Product, RELEASE_PUBLISHED};

    fn customer(id: &str) -> Customer {
        Customer {
            id: id.to_string(),
            team_id: "team".to_string(),
            name: format!("Customer {id}"),
        }
    }

    fn product(id: &str, releases: Vec<Release>) -> ProductWithReleases {
        ProductWithReleases {
            product: Product {
                id: id.to_string(),
                team_id: "team".to_string(),
                name: format!("Product {id}"),
            },
            releases,
        }
    }

    fn release(id: &str, version: &str, status: &str) -> Release {
        Release {
            id: id.to_string(),
            product_id: "p1".to_string(),
            version: version.to_string(),
            status: status.to_string(),
        }
    }

    // --- customer axis ---

    #[test]
    fn no_customers_means_unrestricted() {
        assert_eq!(match_customer(&[], true, None), Ok(None));
        assert_eq!(match_customer(&[], true, Some("c1")), Ok(None));
    }

    #[test]
    fn strict_customers_requires_identifier() {
        let customers = vec![customer("c1")];
        assert_eq!(
            match_customer(&customers, true, None),
            Err(Outcome::CustomerNotFound)
        );
        assert_eq!(match_customer(&customers, false, None), Ok(None));
    }

    #[test]
    fn supplied_customer_must_match_even_in_lenient_mode() {
        let customers = vec![customer("c1"), customer("c2")];
        assert_eq!(
            match_customer(&customers, false, Some("c2")),
            Ok(Some("c2".to_string()))
        );
        assert_eq!(
            match_customer(&customers, false, Some("c3")),
            Err(Outcome::CustomerNotFound)
        );
    }

    // --- product axis ---

    #[test]
    fn strict_products_requires_identifier() {
        let products = vec![product("p1", vec![])];
        assert!(matches!(
            match_product(&products, true, None),
            Err(Outcome::ProductNotFound)
        ));
        assert!(matches!(match_product(&products, false, None), Ok(None)));
    }

    #[test]
    fn supplied_product_must_match() {
        let products = vec![product("p1", vec![])];
        let matched = match_product(&products, false, Some("p1")).expect("match");
        assert_eq!(matched.map(|m| m.product.id.as_str()), Some("p1"));

        assert!(matches!(
            match_product(&products, false, Some("p2")),
            Err(Outcome::ProductNotFound)
        ));
    }

    #[test]
    fn no_products_means_unrestricted() {
        assert!(matches!(match_product(&[], true, Some("p1")), Ok(None)));
    }

    // --- release axis ---

    #[test]
    fn release_axis_disabled_always_passes() {
        let products = vec![product(
            "p1",
            vec![release("r1", "1.0.0", RELEASE_PUBLISHED)],
        )];
        let matched = match_product(&products, false, Some("p1")).unwrap();

        assert!(matches!(
            match_release(matched, true, false, None),
            Ok(None)
        ));
    }

    #[test]
    fn strict_releases_requires_version() {
        let products = vec![product(
            "p1",
            vec![release("r1", "1.0.0", RELEASE_PUBLISHED)],
        )];
        let matched = match_product(&products, false, Some("p1")).unwrap();

        assert!(matches!(
            match_release(matched, true, true, None),
            Err(Outcome::ReleaseNotFound)
        ));
        assert!(matches!(match_release(matched, false, true, None), Ok(None)));
    }

    #[test]
    fn version_must_match_a_published_release() {
        let products = vec![product(
            "p1",
            vec![
                release("r1", "1.0.0", RELEASE_PUBLISHED),
                release("r2", "2.0.0", "DRAFT"),
            ],
        )];
        let matched = match_product(&products, false, Some("p1")).unwrap();

        let found = match_release(matched, false, true, Some("1.0.0")).expect("match");
        assert_eq!(found.map(|r| r.id.as_str()), Some("r1"));

        // Draft releases are not eligible for matching.
        assert!(matches!(
            match_release(matched, false, true, Some("2.0.0")),
            Err(Outcome::ReleaseNotFound)
        ));
    }

    #[test]
    fn product_without_published_releases_is_unrestricted() {
        let products = vec![product("p1", vec![release("r1", "1.0.0", "DRAFT")])];
        let matched = match_product(&products, false, Some("p1")).unwrap();

        assert!(matches!(match_release(matched, true, true, None), Ok(None)));
        assert!(matches!(
            match_release(matched, true, true, Some("9.9.9")),
            Ok(None)
        ));
    }

    #[test]
    fn no_matched_product_skips_release_axis() {
        assert!(matches!(
            match_release(None, true, true, Some("1.0.0")),
            Ok(None)
        ));
    }
}
