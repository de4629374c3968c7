use anyhow::Context;
use kube::ResourceExt;
use node_observability_operator::crd::owned_crds;

fn main() -> anyhow::Result<()> {
    let crds = owned_crds();
    for (i, crd) in crds.iter().enumerate() {
        let yaml = serde_yaml::to_string(crd)
            .with_context(|| format!("serializing CRD {}", crd.name_any()))?;
        if i > 0 {
            println!("---");
        }
        print!("{yaml}");
    }
    Ok(())
}
