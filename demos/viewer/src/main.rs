use view_ngin::{Variant, ViewerConfig};

/// Usage: `viewer [MODEL [DIFFUSE NORMAL]]`
///
/// Paths are relative to `./assets`. `.obj` models are shown with the given
/// (or default) diffuse and normal textures, anything else as glTF.
fn main() {
    let mut args = std::env::args().skip(1);

    let mut config = match args.next() {
        Some(model) => ViewerConfig::from_model_path(&model),
        None => ViewerConfig::default(),
    };
    if let (Variant::ObjTextured { diffuse, normal, .. }, Some(d), Some(n)) =
        (&mut config.variant, args.next(), args.next())
    {
        *diffuse = d;
        *normal = n;
    }

    if let Err(e) = view_ngin::run(config) {
        eprintln!("viewer: {e:?}");
        std::process::exit(1);
    }
}
