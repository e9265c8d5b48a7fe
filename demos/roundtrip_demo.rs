use emlsync::{EntityType, Serialized, SyncConfig};

const EML: &str = r#"<dataset>
  <dataTable id="t1">
    <entityName>cores.csv</entityName>
    <attributeList id="list1">
      <attribute id="a1">
        <attributeName>depth</attributeName>
        <!-- keep this comment -->
        <attributeDefinition>Core depth</attributeDefinition>
        <storageType>float</storageType>
        <measurementScale><ratio><unit><standardUnit>meter</standardUnit></unit></ratio></measurementScale>
      </attribute>
    </attributeList>
  </dataTable>
</dataset>"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let (mut tree, report) = emlsync::load_str(EML, SyncConfig::default())?;
    println!("loaded {} entities", report.entities.len());

    let (attribute, _) = tree
        .of_type(EntityType::Attribute)
        .next()
        .ok_or("no attribute in document")?;
    tree.set_field(attribute, "attributeLabel", vec!["Depth (m)"])?;
    tree.set_field(attribute, "attributeDefinition", "Depth below surface")?;
    println!(
        "dirty: {} (transitions: {})",
        tree.root().is_dirty(),
        tree.root().transitions()
    );

    match tree.update(attribute)? {
        Serialized::Node(node) => println!("{}", emlsync::dom::to_string_pretty(&node)?),
        Serialized::Omit => println!("attribute has no content"),
    }
    tree.mark_saved()?;
    println!("dirty after save: {}", tree.root().is_dirty());
    Ok(())
}
