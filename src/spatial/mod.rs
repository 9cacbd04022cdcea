//! Spatial dialect: WKT geometry literals with envelope-based query
//! functions `search:within` and `search:intersects`.

pub mod wkt;

use crate::codec::IndexCodec;
use crate::error::{IndexError, Result};
use crate::model::{Iri, Term};
use crate::vocab;
use wkt::{Envelope, Geometry};

/// A compiled spatial query.
#[derive(Clone, Debug, PartialEq)]
pub enum GeoQuery {
    /// Candidate's envelope lies inside the query envelope.
    Within(Envelope),
    /// Candidate's envelope overlaps the query envelope.
    Intersects(Envelope),
}

/// Codec for geometry-valued objects serialized as WKT.
///
/// Only literals of an accepted geometry datatype encode; pair it with a
/// matching datatype selection rule so malformed data is rejected instead of
/// silently skipped.
#[derive(Clone, Debug)]
pub struct GeometryCodec {
    datatypes: Vec<Iri>,
}

impl GeometryCodec {
    /// Accepts the store's WKT datatype and the GeoSPARQL `wktLiteral`.
    pub fn new() -> Self {
        Self {
            datatypes: vec![Iri::from(vocab::geo::WKT), Iri::from(vocab::geo::WKT_LITERAL)],
        }
    }

    /// Accepts exactly the given datatypes; the first is the canonical one
    /// used by [`decode`](IndexCodec::decode). Must not be empty.
    pub fn with_datatypes(datatypes: Vec<Iri>) -> Self {
        debug_assert!(!datatypes.is_empty());
        Self { datatypes }
    }

    fn parse_literal(&self, term: &Term, role: &str) -> Result<Geometry> {
        let lexical = term
            .lexical()
            .ok_or_else(|| IndexError::Codec(format!("{role} must be a literal, got {term}")))?;
        wkt::parse(lexical).map_err(|e| IndexError::Codec(format!("{role}: {e}")))
    }
}

impl Default for GeometryCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexCodec for GeometryCodec {
    type Native = Geometry;
    type Query = GeoQuery;

    fn name(&self) -> &str {
        "spatial-wkt"
    }

    fn encode(&self, object: &Term) -> Result<Self::Native> {
        match object.datatype() {
            Some(dt) if self.datatypes.contains(dt) => {}
            _ => {
                return Err(IndexError::Codec(format!(
                    "not a geometry literal: {object}"
                )))
            }
        }
        self.parse_literal(object, "geometry")
    }

    fn decode(&self, native: &Self::Native) -> Term {
        Term::typed_literal(native.to_wkt(), self.datatypes[0].clone())
    }

    fn recognizes(&self, function: &Iri) -> bool {
        matches!(
            function.as_str(),
            vocab::search::WITHIN | vocab::search::INTERSECTS
        )
    }

    fn compile(&self, function: &Iri, params: &[Term]) -> Result<Self::Query> {
        let [shape] = params else {
            return Err(IndexError::Codec(format!(
                "{function} wants one shape argument, got {}",
                params.len()
            )));
        };
        let envelope = self.parse_literal(shape, "query shape")?.envelope();
        match function.as_str() {
            vocab::search::WITHIN => Ok(GeoQuery::Within(envelope)),
            vocab::search::INTERSECTS => Ok(GeoQuery::Intersects(envelope)),
            other => Err(IndexError::Codec(format!(
                "unsupported spatial function <{other}>"
            ))),
        }
    }

    fn matches(&self, query: &Self::Query, value: &Self::Native) -> bool {
        match query {
            GeoQuery::Within(env) => env.contains(&value.envelope()),
            GeoQuery::Intersects(env) => env.intersects(&value.envelope()),
        }
    }
}
