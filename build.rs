use spirv_builder::{MetadataPrintout, SpirvBuilder};

const SHADER_CRATE: &str = "shader";
const SHADER_TARGET: &str = "spirv-unknown-spv1.5";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Kernels compile the shared crate's algorithms, so edits there rebuild the module too.
    println!("cargo:rerun-if-changed=shared/src");
    println!("cargo:rerun-if-changed={SHADER_CRATE}/src");

    SpirvBuilder::new(SHADER_CRATE, SHADER_TARGET)
        .print_metadata(MetadataPrintout::Full)
        .relax_struct_store(true)
        .relax_logical_pointer(true)
        .build()?;
    Ok(())
}
