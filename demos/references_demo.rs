use emlsync::{EntityType, ReferenceLink, Resolution, SyncConfig};

const EML: &str = r#"<dataset>
  <dataTable id="t1">
    <entityName>first.csv</entityName>
    <attributeList id="list1">
      <attribute id="a1">
        <attributeName>site</attributeName>
        <attributeDefinition>Sampling site</attributeDefinition>
      </attribute>
    </attributeList>
  </dataTable>
  <dataTable id="t2">
    <entityName>second.csv</entityName>
    <attributeList id="list2"><references>list1</references></attributeList>
  </dataTable>
</dataset>"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let (mut tree, _) = emlsync::load_str(EML, SyncConfig::default())?;

    let link = ReferenceLink::new("list1", EntityType::AttributeList);
    let target = match tree.resolve(&link) {
        Resolution::Entity(id, _) => id,
        other => return Err(format!("list1 did not resolve to an entity: {other:?}").into()),
    };
    println!("list1 resolves to {target}");
    println!("invalid entities before removal: {}", tree.validate_all()?.len());

    tree.remove(target)?;
    for (id, errors) in tree.validate_all()? {
        println!("{id}: {errors}");
    }
    Ok(())
}
