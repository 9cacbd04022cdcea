//! Well-known IRIs used by the built-in dialects and their tests.

/// Geometry datatypes and properties.
pub mod geo {
    /// Datatype for WKT geometry literals.
    pub const WKT: &str = "http://rdf.opensahara.com/type/geo/wkt";

    /// GeoSPARQL WKT literal datatype, accepted as an alias of [`WKT`].
    pub const WKT_LITERAL: &str = "http://www.opengis.net/ont/geosparql#wktLiteral";

    /// Conventional property linking a feature to its WKT serialization.
    pub const HAS_WKT: &str = "http://www.opengis.net/rdf#hasWKT";
}

/// Magic query functions recognized by the plan rewriter.
pub mod search {
    /// `within(value, shape)`: value's geometry lies inside the shape's envelope.
    pub const WITHIN: &str = "http://rdf.opensahara.com/search#within";

    /// `intersects(value, shape)`: value's envelope overlaps the shape's envelope.
    pub const INTERSECTS: &str = "http://rdf.opensahara.com/search#intersects";

    /// `matches(value, query)`: value's token set contains every query token.
    pub const MATCHES: &str = "http://rdf.opensahara.com/search#matches";
}

/// XML Schema datatypes.
pub mod xsd {
    /// Datatype of plain string literals.
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
}

/// RDF core vocabulary.
pub mod rdf {
    /// Datatype of language-tagged strings.
    pub const LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
}
