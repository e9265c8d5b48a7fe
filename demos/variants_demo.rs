use emlsync::sync::ScaleSwitcher;
use emlsync::{dom, MeasurementScale, ScaleKind, SearchFilter, SyncConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let config = SyncConfig::default();

    let wrapper = dom::parse_str(
        "<measurementScale><interval><unit><customUnit>degC</customUnit></unit>\
         <numericDomain><numberType>real</numberType></numericDomain></interval></measurementScale>",
    )?;
    let scale = MeasurementScale::from_node(&wrapper, &config)?;
    println!("dispatched to {:?} ({})", scale.kind(), scale.record().entity_type());

    let mut switcher = ScaleSwitcher::from_scale(scale).ok_or("scale lost its name")?;
    switcher
        .switch_to(ScaleKind::DateTime)
        .record_mut()
        .set("formatString", "YYYY-MM-DD")?;
    println!("{}", dom::to_string_pretty(&switcher.active().to_wrapped(&config)?)?);
    switcher.switch_to(ScaleKind::Interval);
    println!("{}", dom::to_string_pretty(&switcher.active().to_wrapped(&config)?)?);

    match MeasurementScale::from_node(&dom::parse_str("<measurementScale/>")?, &config) {
        Ok(_) => println!("unexpected dispatch"),
        Err(err) => println!("empty wrapper: {err}"),
    }

    let group = dom::parse_str(
        "<filters><booleanFilter><field>flag</field></booleanFilter>\
         <numericFilter><field>depth</field><min>1</min></numericFilter></filters>",
    )?;
    for filter in SearchFilter::all_in(&group, &config) {
        let fields = filter
            .record
            .get("field")
            .map(ToString::to_string)
            .unwrap_or_default();
        println!("filter {:?}: {fields}", filter.kind);
    }
    Ok(())
}
