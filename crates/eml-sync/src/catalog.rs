//! Schema rules for the EML entities and portal elements the engine edits.
//!
//! Element orders follow the EML 2.2 and collections schemas. Tags listed
//! in an order but not bound to a field (`physical`, `coverage`, ...) are
//! kept as unknown content and only steer where new nodes are inserted.

use crate::schema::{EntityType, FieldRule, SchemaRule};
use crate::validate::ValidationErrors;
use crate::value::FieldMap;

pub static DATA_TABLE: SchemaRule = SchemaRule {
    root_tags: &["dataTable"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::text_list("alternateIdentifier"),
        FieldRule::text("entityName").required("Provide a name for this data table."),
        FieldRule::text("entityDescription"),
        FieldRule::text("caseSensitive"),
        FieldRule::text("numberOfRecords"),
    ],
    order: &[
        "alternateIdentifier",
        "entityName",
        "entityDescription",
        "physical",
        "coverage",
        "methods",
        "additionalInfo",
        "annotation",
        "attributeList",
        "constraint",
        "caseSensitive",
        "numberOfRecords",
    ],
    aliases: &[],
    rules: Some(record_count),
    omit_when_empty: false,
};

/// Attribute children are separate entities; only the reference is a field.
pub static ATTRIBUTE_LIST: SchemaRule = SchemaRule {
    root_tags: &["attributeList"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::reference("references", EntityType::AttributeList),
    ],
    order: &["attribute", "references"],
    aliases: &[],
    rules: None,
    omit_when_empty: true,
};

pub static ATTRIBUTE: SchemaRule = SchemaRule {
    root_tags: &["attribute"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::text("attributeName").required("Provide a name for this attribute."),
        FieldRule::text_list("attributeLabel"),
        FieldRule::text("attributeDefinition")
            .required("Provide a definition for this attribute."),
        FieldRule::text_list("storageType"),
        FieldRule::nested_list("missingValueCode", &MISSING_VALUE_CODE),
    ],
    order: &[
        "attributeName",
        "attributeLabel",
        "attributeDefinition",
        "storageType",
        "measurementScale",
        "missingValueCode",
        "accuracy",
        "coverage",
        "methods",
        "annotation",
    ],
    aliases: &[],
    rules: None,
    omit_when_empty: true,
};

pub static MISSING_VALUE_CODE: SchemaRule = SchemaRule {
    root_tags: &["missingValueCode"],
    fields: &[FieldRule::text("code"), FieldRule::text("codeExplanation")],
    order: &["code", "codeExplanation"],
    aliases: &[],
    rules: Some(code_with_explanation),
    omit_when_empty: true,
};

pub static BOUNDS: SchemaRule = SchemaRule {
    root_tags: &["bounds"],
    fields: &[
        FieldRule::text("minimum"),
        FieldRule::child_attribute("minimumExclusive", "minimum", "exclusive"),
        FieldRule::text("maximum"),
        FieldRule::child_attribute("maximumExclusive", "maximum", "exclusive"),
    ],
    order: &["minimum", "maximum"],
    aliases: &[],
    rules: Some(bounds_in_order),
    omit_when_empty: true,
};

pub static NON_NUMERIC_DOMAIN: SchemaRule = SchemaRule {
    root_tags: &["nominal", "ordinal"],
    fields: &[
        FieldRule::element_name("measurementScale"),
        FieldRule::nested("nonNumericDomain", &NON_NUMERIC_BODY)
            .required("Choose an enumerated or a text domain."),
    ],
    order: &["nonNumericDomain"],
    aliases: &["measurementScale"],
    rules: None,
    omit_when_empty: false,
};

pub static NON_NUMERIC_BODY: SchemaRule = SchemaRule {
    root_tags: &["nonNumericDomain"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::nested("enumeratedDomain", &ENUMERATED_DOMAIN),
        FieldRule::nested("textDomain", &TEXT_DOMAIN),
        FieldRule::reference("references", EntityType::NonNumericDomain),
    ],
    order: &["enumeratedDomain", "textDomain", "references"],
    aliases: &[],
    rules: Some(one_domain_kind),
    omit_when_empty: true,
};

pub static ENUMERATED_DOMAIN: SchemaRule = SchemaRule {
    root_tags: &["enumeratedDomain"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::nested_list("codeDefinition", &CODE_DEFINITION),
    ],
    order: &["codeDefinition", "externalCodeSet", "entityCodeList"],
    aliases: &[],
    rules: None,
    omit_when_empty: true,
};

pub static CODE_DEFINITION: SchemaRule = SchemaRule {
    root_tags: &["codeDefinition"],
    fields: &[
        FieldRule::text("code").required("Provide a code."),
        FieldRule::text("definition").required("Provide a definition for this code."),
        FieldRule::text("source"),
    ],
    order: &["code", "definition", "source"],
    aliases: &[],
    rules: None,
    omit_when_empty: true,
};

pub static TEXT_DOMAIN: SchemaRule = SchemaRule {
    root_tags: &["textDomain"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::text("definition").required("Describe what the text values contain."),
        FieldRule::text_list("pattern"),
        FieldRule::text("source"),
    ],
    order: &["definition", "pattern", "source"],
    aliases: &[],
    rules: None,
    omit_when_empty: true,
};

pub static NUMERIC_DOMAIN: SchemaRule = SchemaRule {
    root_tags: &["ratio", "interval"],
    fields: &[
        FieldRule::element_name("measurementScale"),
        FieldRule::nested("unit", &UNIT).required("Choose a unit."),
        FieldRule::text("precision"),
        FieldRule::nested("numericDomain", &NUMERIC_BODY).required("Choose a number type."),
    ],
    order: &["unit", "precision", "numericDomain"],
    aliases: &["measurementScale"],
    rules: Some(numeric_precision),
    omit_when_empty: false,
};

pub static UNIT: SchemaRule = SchemaRule {
    root_tags: &["unit"],
    fields: &[FieldRule::text("standardUnit"), FieldRule::text("customUnit")],
    order: &["standardUnit", "customUnit"],
    aliases: &[],
    rules: Some(one_unit),
    omit_when_empty: true,
};

pub static NUMERIC_BODY: SchemaRule = SchemaRule {
    root_tags: &["numericDomain"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::text("numberType"),
        FieldRule::nested_list("bounds", &BOUNDS),
        FieldRule::reference("references", EntityType::NumericDomain),
    ],
    order: &["numberType", "bounds", "references"],
    aliases: &[],
    rules: Some(number_type_unless_referenced),
    omit_when_empty: true,
};

pub static DATE_TIME_DOMAIN: SchemaRule = SchemaRule {
    root_tags: &["dateTime"],
    fields: &[
        FieldRule::text("formatString").required("Choose a date-time format."),
        FieldRule::text("dateTimePrecision"),
        FieldRule::nested("dateTimeDomain", &DATE_TIME_BODY),
    ],
    order: &["formatString", "dateTimePrecision", "dateTimeDomain"],
    aliases: &["measurementScale"],
    rules: None,
    omit_when_empty: false,
};

pub static DATE_TIME_BODY: SchemaRule = SchemaRule {
    root_tags: &["dateTimeDomain"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::nested_list("bounds", &BOUNDS),
        FieldRule::reference("references", EntityType::DateTimeDomain),
    ],
    order: &["bounds", "references"],
    aliases: &[],
    rules: None,
    omit_when_empty: true,
};

pub static DISTRIBUTION: SchemaRule = SchemaRule {
    root_tags: &["distribution"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::nested("online", &ONLINE),
        FieldRule::nested("offline", &OFFLINE),
    ],
    order: &["online", "offline", "inline", "access"],
    aliases: &[],
    rules: Some(single_location),
    omit_when_empty: false,
};

/// `urlFunction` follows `url` so a newly created url element carries it.
pub static ONLINE: SchemaRule = SchemaRule {
    root_tags: &["online"],
    fields: &[
        FieldRule::text("onlineDescription"),
        FieldRule::text("url"),
        FieldRule::child_attribute("urlFunction", "url", "function"),
    ],
    order: &[
        "onlineDescription",
        "url",
        "connection",
        "connectionDefinition",
    ],
    aliases: &[],
    rules: Some(url_present),
    omit_when_empty: true,
};

pub static OFFLINE: SchemaRule = SchemaRule {
    root_tags: &["offline"],
    fields: &[
        FieldRule::text("mediumName").required("Provide the name of the medium."),
        FieldRule::text("mediumDensity"),
        FieldRule::text("mediumDensityUnits"),
        FieldRule::text("mediumVolume"),
        FieldRule::text_list("mediumFormat"),
        FieldRule::text("mediumNote"),
    ],
    order: &[
        "mediumName",
        "mediumDensity",
        "mediumDensityUnits",
        "mediumVolume",
        "mediumFormat",
        "mediumNote",
    ],
    aliases: &[],
    rules: None,
    omit_when_empty: true,
};

pub static PORTAL_IMAGE: SchemaRule = SchemaRule {
    root_tags: &["image", "logo"],
    fields: &[
        FieldRule::text("label"),
        FieldRule::text("associatedURL"),
        FieldRule::text("identifier").required("An image is required."),
    ],
    order: &["label", "associatedURL", "identifier"],
    aliases: &[],
    rules: Some(web_address),
    omit_when_empty: true,
};

pub static FILTER: SchemaRule = SchemaRule {
    root_tags: &["filter"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::text("label"),
        FieldRule::text_list("field").required("Choose at least one field to search."),
        FieldRule::text("operator").with_default("AND"),
        FieldRule::text("exclude").with_default("false"),
        FieldRule::text("matchSubstring").with_default("false"),
        FieldRule::text_list("value"),
    ],
    order: &[
        "label",
        "field",
        "operator",
        "exclude",
        "matchSubstring",
        "value",
    ],
    aliases: &[],
    rules: Some(filter_flags),
    omit_when_empty: true,
};

pub static NUMERIC_FILTER: SchemaRule = SchemaRule {
    root_tags: &["numericFilter"],
    fields: &RANGE_FILTER_FIELDS,
    order: RANGE_FILTER_ORDER,
    aliases: &[],
    rules: Some(range_in_order),
    omit_when_empty: true,
};

pub static DATE_FILTER: SchemaRule = SchemaRule {
    root_tags: &["dateFilter"],
    fields: &RANGE_FILTER_FIELDS,
    order: RANGE_FILTER_ORDER,
    aliases: &[],
    rules: Some(range_in_order),
    omit_when_empty: true,
};

pub static BOOLEAN_FILTER: SchemaRule = SchemaRule {
    root_tags: &["booleanFilter"],
    fields: &[
        FieldRule::attribute("id"),
        FieldRule::text("label"),
        FieldRule::text_list("field").required("Choose at least one field to search."),
        FieldRule::text("exclude").with_default("false"),
        FieldRule::text("value"),
    ],
    order: &["label", "field", "exclude", "value"],
    aliases: &[],
    rules: Some(boolean_value),
    omit_when_empty: true,
};

static RANGE_FILTER_FIELDS: [FieldRule; 9] = [
    FieldRule::attribute("id"),
    FieldRule::text("label"),
    FieldRule::text_list("field").required("Choose at least one field to search."),
    FieldRule::text("exclude").with_default("false"),
    FieldRule::text("rangeMin"),
    FieldRule::text("rangeMax"),
    FieldRule::text("min"),
    FieldRule::text("max"),
    FieldRule::text("step").with_default("1"),
];

const RANGE_FILTER_ORDER: &[&str] = &[
    "label", "field", "exclude", "rangeMin", "rangeMax", "min", "max", "step",
];

fn number(fields: &FieldMap, name: &str) -> Option<f64> {
    fields.text(name)?.trim().parse().ok()
}

fn has_text(fields: &FieldMap, name: &str) -> bool {
    fields
        .text(name)
        .is_some_and(|text| !text.trim().is_empty())
}

fn record_count(fields: &FieldMap, errors: &mut ValidationErrors) {
    if has_text(fields, "numberOfRecords")
        && fields
            .text("numberOfRecords")
            .and_then(|text| text.trim().parse::<u64>().ok())
            .is_none()
    {
        errors.add("numberOfRecords", "The number of records must be a whole number.");
    }
}

fn code_with_explanation(fields: &FieldMap, errors: &mut ValidationErrors) {
    match (has_text(fields, "code"), has_text(fields, "codeExplanation")) {
        (true, false) => errors.add("codeExplanation", "Provide an explanation for this code."),
        (false, true) => errors.add("code", "Provide the code this explanation describes."),
        _ => {}
    }
}

fn bounds_in_order(fields: &FieldMap, errors: &mut ValidationErrors) {
    if let (Some(min), Some(max)) = (number(fields, "minimum"), number(fields, "maximum")) {
        if min > max {
            errors.add("minimum", "The minimum must not exceed the maximum.");
        }
    }
}

fn one_domain_kind(fields: &FieldMap, errors: &mut ValidationErrors) {
    let set = |name: &str| fields.get(name).is_some_and(|value| !value.is_empty());
    if set("references") {
        return;
    }
    match (set("enumeratedDomain"), set("textDomain")) {
        (false, false) => errors.add(
            "enumeratedDomain",
            "Choose an enumerated or a text domain.",
        ),
        (true, true) => errors.add(
            "textDomain",
            "A domain is either enumerated or text, not both.",
        ),
        _ => {}
    }
}

fn numeric_precision(fields: &FieldMap, errors: &mut ValidationErrors) {
    if has_text(fields, "precision") && number(fields, "precision").is_none() {
        errors.add("precision", "The precision must be a number.");
    }
}

fn one_unit(fields: &FieldMap, errors: &mut ValidationErrors) {
    if has_text(fields, "standardUnit") && has_text(fields, "customUnit") {
        errors.add("customUnit", "Choose a standard or a custom unit, not both.");
    }
}

fn number_type_unless_referenced(fields: &FieldMap, errors: &mut ValidationErrors) {
    if !has_text(fields, "references") && !has_text(fields, "numberType") {
        errors.add("numberType", "Choose a number type.");
    }
}

fn single_location(fields: &FieldMap, errors: &mut ValidationErrors) {
    let set = |name: &str| fields.get(name).is_some_and(|value| !value.is_empty());
    if set("online") && set("offline") {
        errors.add("offline", "A distribution holds a single location.");
    }
}

fn url_present(fields: &FieldMap, errors: &mut ValidationErrors) {
    if !has_text(fields, "url") {
        errors.add("url", "Provide a URL.");
    }
}

fn web_address(fields: &FieldMap, errors: &mut ValidationErrors) {
    if let Some(url) = fields.text("associatedURL").map(str::trim) {
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.add("associatedURL", "Links must start with http:// or https://.");
        }
    }
}

fn filter_flags(fields: &FieldMap, errors: &mut ValidationErrors) {
    if let Some(operator) = fields.text("operator").map(str::trim) {
        if !operator.is_empty() && operator != "AND" && operator != "OR" {
            errors.add("operator", "The operator must be AND or OR.");
        }
    }
    for flag in ["exclude", "matchSubstring"] {
        check_boolean(fields, flag, errors);
    }
}

fn range_in_order(fields: &FieldMap, errors: &mut ValidationErrors) {
    for name in ["rangeMin", "rangeMax", "min", "max", "step"] {
        if has_text(fields, name) && number(fields, name).is_none() {
            errors.add(name, "Enter a number.");
        }
    }
    if let (Some(min), Some(max)) = (number(fields, "min"), number(fields, "max")) {
        if min > max {
            errors.add("min", "The minimum must not exceed the maximum.");
        }
    }
    if let (Some(min), Some(max)) = (number(fields, "rangeMin"), number(fields, "rangeMax")) {
        if min > max {
            errors.add("rangeMin", "The lower range limit must not exceed the upper one.");
        }
    }
    check_boolean(fields, "exclude", errors);
}

fn boolean_value(fields: &FieldMap, errors: &mut ValidationErrors) {
    check_boolean(fields, "exclude", errors);
    check_boolean(fields, "value", errors);
}

fn check_boolean(fields: &FieldMap, name: &str, errors: &mut ValidationErrors) {
    if let Some(text) = fields.text(name).map(str::trim) {
        if !text.is_empty() && text != "true" && text != "false" {
            errors.add(name, "The value must be true or false.");
        }
    }
}
