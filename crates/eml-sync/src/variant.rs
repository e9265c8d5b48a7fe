//! Variant dispatch for subtrees whose entity type depends on a
//! discriminator element.

use std::collections::BTreeMap;

use eml_dom::{TagMatching, XmlNode};
use tracing::debug;

use crate::config::SyncConfig;
use crate::record::Record;
use crate::schema::EntityType;
use crate::update::Serialized;
use crate::value::FieldMap;
use crate::SyncError;

/// Mutually exclusive discriminator tags mapped to variant kinds.
#[derive(Debug)]
pub struct VariantGroup<K: 'static> {
    pub name: &'static str,
    /// Element that wraps discriminator elements. When set, children are
    /// only searched inside an element with this name.
    pub wrapper: Option<&'static str>,
    /// Attribute that names the variant explicitly, if any.
    pub type_attribute: Option<&'static str>,
    pub variants: &'static [(&'static str, K)],
}

impl<K: Copy> VariantGroup<K> {
    /// Kind registered for `tag`, with the tag's canonical spelling.
    pub fn lookup(&self, tag: &str, mode: TagMatching) -> Option<(&'static str, K)> {
        self.variants
            .iter()
            .copied()
            .find(|(name, _)| mode.matches(name, tag))
    }

    fn unrecognized(&self, found: Vec<String>) -> SyncError {
        SyncError::UnrecognizedVariant {
            group: self.name.to_string(),
            found,
        }
    }
}

/// A resolved discriminator and the element the variant is bound to.
#[derive(Debug, Clone, Copy)]
pub struct Variant<'a, K> {
    pub discriminator: &'static str,
    pub kind: K,
    pub node: &'a XmlNode,
}

/// Decide which variant `node` holds.
///
/// An explicit type attribute wins, then the element's own name, then
/// exactly one matching child element of the group's wrapper. Zero or
/// several matching children is an error; there is no fallback variant.
pub fn resolve_variant<'a, K: Copy>(
    node: &'a XmlNode,
    group: &VariantGroup<K>,
    mode: TagMatching,
) -> Result<Variant<'a, K>, SyncError> {
    if let Some(value) = group
        .type_attribute
        .and_then(|attribute| node.attribute(attribute, mode))
    {
        let (discriminator, kind) = group
            .lookup(value.trim(), mode)
            .ok_or_else(|| group.unrecognized(vec![value.to_string()]))?;
        debug!(group = group.name, discriminator, "variant from type attribute");
        return Ok(Variant {
            discriminator,
            kind,
            node,
        });
    }
    if let Some((discriminator, kind)) = group.lookup(node.local_name(), mode) {
        debug!(group = group.name, discriminator, "variant from element name");
        return Ok(Variant {
            discriminator,
            kind,
            node,
        });
    }
    if let Some(wrapper) = group.wrapper {
        if !node.is_named(wrapper, mode) {
            return Err(group.unrecognized(vec![node.name.clone()]));
        }
    }
    let mut matches = node
        .elements()
        .filter_map(|child| {
            group
                .lookup(child.local_name(), mode)
                .map(|(discriminator, kind)| (discriminator, kind, child))
        });
    match (matches.next(), matches.next()) {
        (Some((discriminator, kind, child)), None) => {
            debug!(group = group.name, discriminator, "variant from child element");
            Ok(Variant {
                discriminator,
                kind,
                node: child,
            })
        }
        (Some(first), Some(second)) => {
            let mut found = vec![first.2.name.clone(), second.2.name.clone()];
            found.extend(matches.map(|(_, _, child)| child.name.clone()));
            Err(group.unrecognized(found))
        }
        (None, _) => Err(group.unrecognized(
            node.elements().map(|child| child.name.clone()).collect(),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScaleKind {
    Nominal,
    Ordinal,
    Interval,
    Ratio,
    DateTime,
}

impl ScaleKind {
    pub const ALL: [ScaleKind; 5] = [
        ScaleKind::Nominal,
        ScaleKind::Ordinal,
        ScaleKind::Interval,
        ScaleKind::Ratio,
        ScaleKind::DateTime,
    ];

    /// Entity type whose schema binds this scale.
    pub fn entity_type(self) -> EntityType {
        match self {
            ScaleKind::Nominal | ScaleKind::Ordinal => EntityType::NonNumericDomain,
            ScaleKind::Interval | ScaleKind::Ratio => EntityType::NumericDomain,
            ScaleKind::DateTime => EntityType::DateTimeDomain,
        }
    }

    /// Discriminator element name.
    pub fn tag(self) -> &'static str {
        match self {
            ScaleKind::Nominal => "nominal",
            ScaleKind::Ordinal => "ordinal",
            ScaleKind::Interval => "interval",
            ScaleKind::Ratio => "ratio",
            ScaleKind::DateTime => "dateTime",
        }
    }
}

pub static MEASUREMENT_SCALE: VariantGroup<ScaleKind> = VariantGroup {
    name: "measurementScale",
    wrapper: Some("measurementScale"),
    type_attribute: None,
    variants: &[
        ("nominal", ScaleKind::Nominal),
        ("ordinal", ScaleKind::Ordinal),
        ("interval", ScaleKind::Interval),
        ("ratio", ScaleKind::Ratio),
        ("dateTime", ScaleKind::DateTime),
    ],
};

/// The three record shapes behind the five measurement scales.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementScale {
    NonNumeric(Record),
    Numeric(Record),
    DateTime(Record),
}

impl MeasurementScale {
    /// Dispatch a `<measurementScale>` wrapper or a bare scale element.
    pub fn from_node(node: &XmlNode, config: &SyncConfig) -> Result<Self, SyncError> {
        let variant = resolve_variant(node, &MEASUREMENT_SCALE, config.tag_matching)?;
        let record = Record::parse(variant.kind.entity_type(), variant.node, config);
        Ok(Self::wrap(variant.kind, record))
    }

    /// A fresh scale with no source.
    pub fn new(kind: ScaleKind) -> Self {
        let fields = match kind {
            ScaleKind::DateTime => FieldMap::new(),
            _ => FieldMap::new().with("measurementScale", kind.tag()),
        };
        Self::wrap(kind, Record::from_fields(kind.entity_type(), fields))
    }

    /// A fresh scale from a discriminator name such as `"ratio"`.
    pub fn from_name(name: &str) -> Result<Self, SyncError> {
        let (_, kind) = MEASUREMENT_SCALE
            .lookup(name.trim(), TagMatching::CaseInsensitive)
            .ok_or_else(|| MEASUREMENT_SCALE.unrecognized(vec![name.to_string()]))?;
        Ok(Self::new(kind))
    }

    fn wrap(kind: ScaleKind, record: Record) -> Self {
        match kind {
            ScaleKind::Nominal | ScaleKind::Ordinal => MeasurementScale::NonNumeric(record),
            ScaleKind::Interval | ScaleKind::Ratio => MeasurementScale::Numeric(record),
            ScaleKind::DateTime => MeasurementScale::DateTime(record),
        }
    }

    /// Scale named by the record, `None` when a numeric or non-numeric
    /// record has lost its element name.
    pub fn kind(&self) -> Option<ScaleKind> {
        match self {
            MeasurementScale::DateTime(_) => Some(ScaleKind::DateTime),
            MeasurementScale::NonNumeric(record) | MeasurementScale::Numeric(record) => {
                let name = record.text("measurementScale")?;
                MEASUREMENT_SCALE
                    .lookup(name, TagMatching::CaseInsensitive)
                    .map(|(_, kind)| kind)
            }
        }
    }

    pub fn record(&self) -> &Record {
        match self {
            MeasurementScale::NonNumeric(record)
            | MeasurementScale::Numeric(record)
            | MeasurementScale::DateTime(record) => record,
        }
    }

    pub fn record_mut(&mut self) -> &mut Record {
        match self {
            MeasurementScale::NonNumeric(record)
            | MeasurementScale::Numeric(record)
            | MeasurementScale::DateTime(record) => record,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            MeasurementScale::NonNumeric(record)
            | MeasurementScale::Numeric(record)
            | MeasurementScale::DateTime(record) => record,
        }
    }

    /// Write the scale element back (`<ratio>`, `<dateTime>`, ...).
    pub fn update(&self, config: &SyncConfig) -> Result<Serialized, SyncError> {
        self.record().update(config)
    }

    /// Write the scale inside its `<measurementScale>` wrapper.
    pub fn to_wrapped(&self, config: &SyncConfig) -> Result<XmlNode, SyncError> {
        let wrapper = XmlNode::new(MEASUREMENT_SCALE.wrapper.unwrap_or(MEASUREMENT_SCALE.name));
        Ok(match self.update(config)? {
            Serialized::Node(node) => wrapper.child_node(node),
            Serialized::Omit => wrapper,
        })
    }
}

/// Keeps one scale per kind so switching away and back keeps edits.
#[derive(Debug, Clone)]
pub struct ScaleSwitcher {
    active_kind: ScaleKind,
    active: MeasurementScale,
    parked: BTreeMap<ScaleKind, MeasurementScale>,
}

impl ScaleSwitcher {
    pub fn new(kind: ScaleKind, scale: MeasurementScale) -> Self {
        ScaleSwitcher {
            active_kind: kind,
            active: scale,
            parked: BTreeMap::new(),
        }
    }

    /// Start from a parsed scale, whose kind comes from the record.
    pub fn from_scale(scale: MeasurementScale) -> Option<Self> {
        let kind = scale.kind()?;
        Some(Self::new(kind, scale))
    }

    pub fn kind(&self) -> ScaleKind {
        self.active_kind
    }

    pub fn active(&self) -> &MeasurementScale {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut MeasurementScale {
        &mut self.active
    }

    /// Make `kind` active, reviving the scale last used for it.
    pub fn switch_to(&mut self, kind: ScaleKind) -> &mut MeasurementScale {
        if kind != self.active_kind {
            let next = self
                .parked
                .remove(&kind)
                .unwrap_or_else(|| MeasurementScale::new(kind));
            let previous = std::mem::replace(&mut self.active, next);
            self.parked.insert(self.active_kind, previous);
            debug!(from = ?self.active_kind, to = ?kind, "switched measurement scale");
            self.active_kind = kind;
        }
        &mut self.active
    }

    pub fn into_active(self) -> MeasurementScale {
        self.active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKind {
    Text,
    Numeric,
    Date,
    Boolean,
}

impl FilterKind {
    pub fn entity_type(self) -> EntityType {
        match self {
            FilterKind::Text => EntityType::Filter,
            FilterKind::Numeric => EntityType::NumericFilter,
            FilterKind::Date => EntityType::DateFilter,
            FilterKind::Boolean => EntityType::BooleanFilter,
        }
    }
}

pub static SEARCH_FILTER: VariantGroup<FilterKind> = VariantGroup {
    name: "filter",
    wrapper: Some("definition"),
    type_attribute: None,
    variants: &[
        ("filter", FilterKind::Text),
        ("numericFilter", FilterKind::Numeric),
        ("dateFilter", FilterKind::Date),
        ("booleanFilter", FilterKind::Boolean),
    ],
};

/// A collection search filter of any kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilter {
    pub kind: FilterKind,
    pub record: Record,
}

impl SearchFilter {
    pub fn from_node(node: &XmlNode, config: &SyncConfig) -> Result<Self, SyncError> {
        let variant = resolve_variant(node, &SEARCH_FILTER, config.tag_matching)?;
        Ok(SearchFilter {
            kind: variant.kind,
            record: Record::parse(variant.kind.entity_type(), variant.node, config),
        })
    }

    pub fn new(kind: FilterKind) -> Self {
        SearchFilter {
            kind,
            record: Record::new(kind.entity_type()),
        }
    }

    /// Every filter element inside `group`, in document order. Filters
    /// held in nested `<definition>` wrappers are included.
    pub fn all_in(group: &XmlNode, config: &SyncConfig) -> Vec<Self> {
        let mut filters = Vec::new();
        collect_filters(group, config, &mut filters);
        filters
    }
}

fn collect_filters(group: &XmlNode, config: &SyncConfig, filters: &mut Vec<SearchFilter>) {
    let mode = config.tag_matching;
    for child in group.elements() {
        if let Some((_, kind)) = SEARCH_FILTER.lookup(child.local_name(), mode) {
            filters.push(SearchFilter {
                kind,
                record: Record::parse(kind.entity_type(), child, config),
            });
        } else if SEARCH_FILTER
            .wrapper
            .is_some_and(|wrapper| child.is_named(wrapper, mode))
        {
            collect_filters(child, config, filters);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;
    use eml_dom::parse_str;

    #[test]
    fn every_scale_dispatches_to_its_shape() {
        let config = SyncConfig::default();
        for kind in ScaleKind::ALL {
            let xml = format!("<measurementScale><{0}/></measurementScale>", kind.tag());
            let node = parse_str(&xml).expect("fixture");
            let scale = MeasurementScale::from_node(&node, &config).expect("dispatch");
            assert_eq!(scale.kind(), Some(kind));
            assert_eq!(scale.record().entity_type(), kind.entity_type());
        }
    }

    #[test]
    fn bare_roots_set_measurement_scale() {
        let config = SyncConfig::default();
        let ratio = parse_str("<ratio><unit><standardUnit>meter</standardUnit></unit></ratio>")
            .expect("ratio");
        let scale = MeasurementScale::from_node(&ratio, &config).expect("ratio");
        assert!(matches!(scale, MeasurementScale::Numeric(_)));
        assert_eq!(scale.record().text("measurementScale"), Some("ratio"));

        let nominal = parse_str("<nominal><nonNumericDomain/></nominal>").expect("nominal");
        let scale = MeasurementScale::from_node(&nominal, &config).expect("nominal");
        assert!(matches!(scale, MeasurementScale::NonNumeric(_)));
        assert_eq!(scale.record().text("measurementScale"), Some("nominal"));
    }

    #[test]
    fn unknown_or_ambiguous_discriminators_fail() {
        let config = SyncConfig::default();
        let unknown = parse_str("<measurementScale><logarithmic/></measurementScale>")
            .expect("unknown");
        match MeasurementScale::from_node(&unknown, &config) {
            Err(SyncError::UnrecognizedVariant { group, found }) => {
                assert_eq!(group, "measurementScale");
                assert_eq!(found, vec!["logarithmic".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        let both = parse_str("<measurementScale><ratio/><interval/></measurementScale>")
            .expect("both");
        assert!(matches!(
            MeasurementScale::from_node(&both, &config),
            Err(SyncError::UnrecognizedVariant { .. })
        ));
        assert!(MeasurementScale::from_name("logarithmic").is_err());
        let exact = parse_str("<measurementScale><Ratio/></measurementScale>").expect("case");
        assert!(MeasurementScale::from_node(&exact, &SyncConfig::exact()).is_err());
    }

    #[test]
    fn type_attribute_takes_precedence() {
        static TYPED: VariantGroup<FilterKind> = VariantGroup {
            name: "typed",
            wrapper: None,
            type_attribute: Some("type"),
            variants: &[("range", FilterKind::Numeric), ("flag", FilterKind::Boolean)],
        };
        let node = parse_str("<filter type=\"flag\"><range/></filter>").expect("fixture");
        let variant = resolve_variant(&node, &TYPED, TagMatching::CaseInsensitive)
            .expect("typed");
        assert_eq!(variant.kind, FilterKind::Boolean);
        assert_eq!(variant.node.name, "filter");
        let bad = parse_str("<filter type=\"other\"/>").expect("fixture");
        assert!(resolve_variant(&bad, &TYPED, TagMatching::CaseInsensitive).is_err());
    }

    #[test]
    fn switching_scales_keeps_edits() {
        let mut switcher = ScaleSwitcher::from_scale(MeasurementScale::new(ScaleKind::Ratio))
            .expect("kind");
        switcher
            .active_mut()
            .record_mut()
            .set("precision", "0.5")
            .expect("precision");
        switcher.switch_to(ScaleKind::Nominal);
        assert!(matches!(switcher.active(), MeasurementScale::NonNumeric(_)));
        let ratio = switcher.switch_to(ScaleKind::Ratio);
        assert_eq!(ratio.record().text("precision"), Some("0.5"));
        assert_eq!(switcher.kind(), ScaleKind::Ratio);
    }

    #[test]
    fn wrapped_output_for_new_scale() {
        let config = SyncConfig::default();
        let mut scale = MeasurementScale::from_name("Interval").expect("interval");
        scale
            .record_mut()
            .set("unit.standardUnit", "celsius")
            .expect("unit");
        let node = scale.to_wrapped(&config).expect("wrapped");
        assert_eq!(
            eml_dom::to_string(&node).expect("write"),
            "<measurementScale><interval><unit><standardUnit>celsius</standardUnit></unit>\
             </interval></measurementScale>"
        );
    }

    #[test]
    fn filters_in_a_definition() {
        let config = SyncConfig::default();
        let definition = parse_str(
            "<definition><filter><field>title</field><value>soil</value></filter>\
             <numericFilter><field>year</field><min>2000</min><max>2010</max></numericFilter>\
             <booleanFilter><field>isPublic</field><value>true</value></booleanFilter>\
             <note/></definition>",
        )
        .expect("fixture");
        let filters = SearchFilter::all_in(&definition, &config);
        let kinds: Vec<FilterKind> = filters.iter().map(|filter| filter.kind).collect();
        assert_eq!(
            kinds,
            vec![FilterKind::Text, FilterKind::Numeric, FilterKind::Boolean]
        );
        assert_eq!(filters[1].record.text("min"), Some("2000"));
        assert!(filters.iter().all(|filter| filter.record.validate().is_empty()));

        let date = parse_str("<dateFilter><field>beginDate</field></dateFilter>").expect("date");
        let filter = SearchFilter::from_node(&date, &config).expect("date filter");
        assert_eq!(filter.kind, FilterKind::Date);
        assert!(SearchFilter::new(FilterKind::Boolean).record.is_empty());

        let inner = eml_dom::to_string(&definition).expect("write");
        let collection =
            parse_str(&format!("<collection><label>Soils</label>{inner}</collection>"))
                .expect("collection");
        assert_eq!(SearchFilter::all_in(&collection, &config).len(), 3);
    }

    #[test]
    fn discriminators_are_searched_only_inside_the_wrapper() {
        let config = SyncConfig::default();
        let wrapped = parse_str(
            "<definition><dateFilter><field>beginDate</field></dateFilter></definition>",
        )
        .expect("wrapped");
        let filter = SearchFilter::from_node(&wrapped, &config).expect("wrapped filter");
        assert_eq!(filter.kind, FilterKind::Date);
        assert_eq!(filter.record.get("field"), Some(&FieldValue::from(vec!["beginDate"])));

        let stray = parse_str("<attribute><ratio/></attribute>").expect("stray");
        match MeasurementScale::from_node(&stray, &config) {
            Err(SyncError::UnrecognizedVariant { found, .. }) => {
                assert_eq!(found, vec!["attribute".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
