use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use garc_core::error::{GarcError, Result};
use garc_core::{
    ArcFile, ArchiveOperation, DecodedImage, Detected, FormatCatalog, ImageData, SchemeCatalog,
    extract_all,
};
use walkdir::WalkDir;

use crate::presentation::cli::SchemeArgs;

const BMP_HEADER_SIZE: u32 = 54;

fn catalog_from_args(args: SchemeArgs) -> Result<FormatCatalog> {
    let mut schemes = match &args.schemes {
        Some(path) => SchemeCatalog::load(io::BufReader::new(File::open(path)?))?,
        None => SchemeCatalog::default(),
    };
    if args.ask {
        let titles: Vec<String> = schemes.database().cyberworks.keys().cloned().collect();
        schemes.set_prompt(move |question| prompt_title(question, &titles));
    }
    Ok(FormatCatalog::new(schemes))
}

fn prompt_title(question: &str, titles: &[String]) -> Option<String> {
    eprintln!("{question}");
    for t in titles {
        eprintln!("  {t}");
    }
    eprint!("> ");
    io::stderr().flush().ok()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_owned())
}

fn open_archive(catalog: &FormatCatalog, path: &Path) -> Result<ArcFile> {
    catalog
        .open_archive(path)?
        .ok_or_else(|| GarcError::NotFound(format!("{}: not a recognized archive", path.display())))
}

pub fn handle_formats() -> Result<()> {
    let catalog = FormatCatalog::default();
    println!("archives:");
    for f in catalog.archive_formats() {
        println!("  {:<14} {}", f.tag(), f.description());
    }
    println!("images:");
    for f in catalog.image_formats() {
        println!("  {:<14} {}", f.tag(), f.description());
    }
    Ok(())
}

pub fn handle_list(archive: PathBuf, schemes: SchemeArgs) -> Result<()> {
    let catalog = catalog_from_args(schemes)?;
    let arc = open_archive(&catalog, &archive)?;
    let mut rows: Vec<_> = arc.entries().iter().collect();
    rows.sort_by_key(|e| e.offset);
    for e in rows {
        println!("{:>9} [{:08X}] {}", e.size, e.offset, e.name);
    }
    eprintln!("{}: {} entries ({})", archive.display(), arc.len(), arc.format().tag());
    Ok(())
}

fn extract_one(arc: &ArcFile, dest: &Path) -> Result<()> {
    let summary = extract_all(arc, dest, |_, entry, msg| {
        if let (Some(e), Some(m)) = (entry, msg) {
            eprintln!("{}: {m}", e.name);
        }
        ArchiveOperation::Continue
    })?;
    eprintln!(
        "extract: {} written, {} failed -> {}",
        summary.extracted,
        summary.failed,
        dest.display()
    );
    Ok(())
}

pub fn handle_extract(input: PathBuf, dest: PathBuf, recursive: bool, schemes: SchemeArgs) -> Result<()> {
    let catalog = catalog_from_args(schemes)?;
    if !input.is_dir() {
        let arc = open_archive(&catalog, &input)?;
        return extract_one(&arc, &dest);
    }

    let depth = if recursive { usize::MAX } else { 1 };
    for entry in WalkDir::new(&input).max_depth(depth).sort_by_file_name() {
        let entry = entry.map_err(|e| GarcError::Io(io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        match catalog.open_archive(path) {
            Ok(Some(arc)) => {
                let rel = path.strip_prefix(&input).unwrap_or(path);
                tracing::info!(archive = %path.display(), format = arc.format().tag(), "extracting");
                extract_one(&arc, &dest.join(rel))?;
            }
            Ok(None) => tracing::debug!(file = %path.display(), "not an archive"),
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "cannot open"),
        }
    }
    Ok(())
}

pub fn handle_image(input: PathBuf, out: PathBuf, entry: Option<String>, schemes: SchemeArgs) -> Result<()> {
    let catalog = catalog_from_args(schemes)?;
    let image = match (catalog.open_path(&input)?, entry) {
        (Some(Detected::Image(img)), None) => img.decode()?,
        (Some(Detected::Archive(arc)), Some(name)) => {
            let (i, _) = arc
                .find(&name)
                .ok_or_else(|| GarcError::NotFound(format!("{}: no entry {name}", input.display())))?;
            arc.open_image(i)?
        }
        (Some(Detected::Archive(_)), None) => {
            return Err(GarcError::NotFound(format!(
                "{} is an archive; pick an image with --entry",
                input.display()
            )));
        }
        (Some(Detected::Image(_)), Some(_)) => {
            return Err(GarcError::NotFound(format!("{} is not an archive", input.display())));
        }
        (None, _) => {
            return Err(GarcError::NotFound(format!(
                "{}: not a recognized archive or image",
                input.display()
            )));
        }
    };

    let info = image.info();
    eprintln!(
        "image: {}x{} {}bpp offset ({}, {})",
        info.width, info.height, info.bpp, info.offset_x, info.offset_y
    );
    for path in write_image(image, &out)? {
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

/// Plain embedded payloads are written as-is. Anything that needs merging or
/// reordering is decoded and written as BMP.
fn write_image(image: DecodedImage, out: &Path) -> Result<Vec<PathBuf>> {
    let img = match image {
        DecodedImage::Embedded(img) if img.alpha.is_none() && !img.flip_vertical => {
            let path = out.with_extension(img.kind.extension());
            fs::write(&path, &img.data)?;
            return Ok(vec![path]);
        }
        DecodedImage::Embedded(img) => img.to_pixels()?,
        DecodedImage::Pixels(img) => img,
    };
    let path = out.with_extension("bmp");
    let mut w = BufWriter::new(File::create(&path)?);
    write_bmp(&img, &mut w)?;
    w.flush()?;
    Ok(vec![path])
}

/// Top-down 32-bit BMP.
fn write_bmp(img: &ImageData, w: &mut impl Write) -> Result<()> {
    let bgra = img.to_bgra32();
    let data_len = u32::try_from(bgra.len()).map_err(|_| GarcError::SizeOverflow)?;
    let file_len = data_len.checked_add(BMP_HEADER_SIZE).ok_or(GarcError::SizeOverflow)?;
    let width = i32::try_from(img.width()).map_err(|_| GarcError::SizeOverflow)?;
    let height = i32::try_from(img.height()).map_err(|_| GarcError::SizeOverflow)?;

    w.write_all(b"BM")?;
    w.write_all(&file_len.to_le_bytes())?;
    w.write_all(&[0u8; 4])?;
    w.write_all(&BMP_HEADER_SIZE.to_le_bytes())?;
    w.write_all(&40u32.to_le_bytes())?;
    w.write_all(&width.to_le_bytes())?;
    w.write_all(&(-height).to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&32u16.to_le_bytes())?;
    w.write_all(&0u32.to_le_bytes())?;
    w.write_all(&data_len.to_le_bytes())?;
    w.write_all(&[0u8; 16])?;
    w.write_all(&bgra)?;
    Ok(())
}
