use bytesize::ByteSize;
use comfy_table::{
    Cell, CellAlignment, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};
use eyre_pretty::{Context, ContextCompat, Result};
use vtxdec::{DecoderCache, DecoderOptions, DescriptionKind, VertexType};
use vtxjit::{Compiler, Settings};

pub fn describe(vtypes: &[u32], options: DecoderOptions, detailed: bool) -> Result<()> {
    let compiler = Compiler::new(Settings::default()).context("creating decoder compiler")?;
    let mut cache = DecoderCache::new(compiler);

    if detailed {
        for &vtype in vtypes {
            let decoder = cache.get(VertexType::from_bits(vtype), options);
            println!("{}\n", decoder.describe(DescriptionKind::Detailed));
        }

        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Type").set_alignment(CellAlignment::Center),
            Cell::new("Summary").set_alignment(CellAlignment::Center),
            Cell::new("Size").set_alignment(CellAlignment::Center),
            Cell::new("Stride").set_alignment(CellAlignment::Center),
            Cell::new("Format").set_alignment(CellAlignment::Center),
            Cell::new("Compiled").set_alignment(CellAlignment::Center),
        ]);

    for &vtype in vtypes {
        let decoder = cache.get(VertexType::from_bits(vtype), options);
        let compiled = match decoder.jitted() {
            Some(jitted) => format!("{}", ByteSize(jitted.size as u64).display()),
            None => "-".to_owned(),
        };

        table.add_row(vec![
            Cell::new(format!("0x{vtype:08X}")),
            Cell::new(decoder.summary()),
            Cell::new(decoder.size()).set_alignment(CellAlignment::Right),
            Cell::new(decoder.stride()).set_alignment(CellAlignment::Right),
            Cell::new(format!("0x{:06X}", decoder.format().id())),
            Cell::new(compiled).set_alignment(CellAlignment::Center),
        ]);
    }

    println!("{table}");

    Ok(())
}

pub fn disasm(vtype: u32, options: DecoderOptions, ir: bool) -> Result<()> {
    let settings = Settings {
        keep_disassembly: true,
        ..Default::default()
    };

    let mut compiler = Compiler::new(settings).context("creating decoder compiler")?;
    let decoder = vtxdec::VertexDecoder::new(VertexType::from_bits(vtype), options);
    println!("{}\n", decoder.describe(DescriptionKind::Short));

    if ir {
        let func = compiler
            .build_ir::<vtxjit::target::HostTarget>(&decoder)
            .context("building decoder")?;

        println!("{}", func.display());
        return Ok(());
    }

    let jitted = compiler
        .compile_for::<vtxjit::target::HostTarget>(&decoder)
        .context("compiling decoder")?;

    let listing = jitted
        .disassembly
        .context("code generator produced no listing")?;

    println!("{listing}");
    println!("{}", ByteSize(jitted.size as u64).display());

    Ok(())
}
