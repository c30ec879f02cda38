//! PDF output for an assembled document

use std::fmt::Write as _;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use proxy_layout::constants::{
    CUT_GUIDE_WIDTH_MM, DOTTED_DASH_MM, FOOTER_FONT_SIZE, FOOTER_OFFSET_BOTTOM_MM,
    FOOTER_OFFSET_LEFT_MM, PLACEHOLDER_BORDER_WIDTH_MM, PLACEHOLDER_FONT_SIZE, mm_to_pt,
};
use proxy_layout::PageBackground;

use crate::assemble::{AssembledDocument, AssembledPage, AssembledSlot, SlotContent};
use crate::types::{Result, Tile, TileError};

/// Text inset of a placeholder from the card's top-left corner
const PLACEHOLDER_TEXT_INSET_MM: f32 = 5.0;
const PLACEHOLDER_LINE_SPACING_MM: f32 = 5.0;

/// Render and write the document to `path`
pub async fn write_pdf(doc: &AssembledDocument, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref().to_owned();
    let doc = doc.clone();

    // PDF serialization is CPU-bound, spawn blocking
    let bytes = tokio::task::spawn_blocking(move || render_pdf_bytes(&doc)).await??;

    tokio::fs::write(&path, bytes).await?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Serialize the document to PDF bytes.
///
/// Tiles are embedded as-is (DCT encoded) and drawn at card size plus bleed
/// on every side, so the bleed runs under neighbouring gutters.
pub fn render_pdf_bytes(doc: &AssembledDocument) -> Result<Vec<u8>> {
    let mut output = Document::with_version("1.7");
    let pages_tree_id = output.new_object_id();

    let mut font_dict = Dictionary::new();
    font_dict.set("Type", Object::Name(b"Font".to_vec()));
    font_dict.set("Subtype", Object::Name(b"Type1".to_vec()));
    font_dict.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    font_dict.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    let font_id = output.add_object(font_dict);

    let mut page_refs = Vec::with_capacity(doc.pages.len());
    for page in &doc.pages {
        let page_id = render_page(&mut output, doc, page, pages_tree_id, font_id);
        page_refs.push(Object::Reference(page_id));
    }

    let count = page_refs.len() as i64;
    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(page_refs)),
        ("Count", Object::Integer(count)),
    ]);
    output
        .objects
        .insert(pages_tree_id, Object::Dictionary(pages_dict));

    let catalog_id = output.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_tree_id)),
    ]));
    output.trailer.set("Root", catalog_id);

    let mut writer = Vec::new();
    output
        .save_to(&mut writer)
        .map_err(|e| TileError::Pdf(e.to_string()))?;
    Ok(writer)
}

fn render_page(
    output: &mut Document,
    doc: &AssembledDocument,
    page: &AssembledPage,
    parent: ObjectId,
    font_id: ObjectId,
) -> ObjectId {
    let page_w = mm_to_pt(doc.page_width_mm);
    let page_h = mm_to_pt(doc.page_height_mm);
    let mut ops = String::new();
    let mut xobjects = Dictionary::new();

    if doc.background != PageBackground::White {
        let [r, g, b] = rgb_components(doc.background.rgb());
        let _ = writeln!(ops, "q {} {} {} rg 0 0 {} {} re f Q", r, g, b, page_w, page_h);
    }

    for (i, slot) in page.slots.iter().enumerate() {
        match &slot.content {
            SlotContent::Tile(tile) => {
                let name = format!("Im{}", i);
                let image_id = output.add_object(image_xobject(tile));
                xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
                ops.push_str(&tile_placement(doc, slot, &name));
            }
            SlotContent::Placeholder {
                label,
                name,
                border_rgb,
            } => ops.push_str(&placeholder_ops(doc, slot, label, name, *border_rgb)),
        }
    }

    if !page.guides.is_empty() {
        let gray = doc.background.guide_gray() as f32 / 255.0;
        let _ = writeln!(ops, "q {} G {} w", gray, mm_to_pt(CUT_GUIDE_WIDTH_MM));
        let mut dashed = false;
        for seg in &page.guides {
            if seg.dashed != dashed {
                dashed = seg.dashed;
                if dashed {
                    let dash = mm_to_pt(DOTTED_DASH_MM);
                    let _ = writeln!(ops, "[{} {}] 0 d", dash, dash);
                } else {
                    ops.push_str("[] 0 d\n");
                }
            }
            let _ = writeln!(
                ops,
                "{} {} m {} {} l S",
                mm_to_pt(seg.x1),
                page_h - mm_to_pt(seg.y1),
                mm_to_pt(seg.x2),
                page_h - mm_to_pt(seg.y2)
            );
        }
        ops.push_str("Q\n");
    }

    if let Some(footer) = &page.footer {
        let gray = doc.background.footer_gray() as f32 / 255.0;
        let _ = writeln!(
            ops,
            "BT /F1 {} Tf {} g {} {} Td ({}) Tj ET",
            FOOTER_FONT_SIZE,
            gray,
            mm_to_pt(FOOTER_OFFSET_LEFT_MM),
            mm_to_pt(FOOTER_OFFSET_BOTTOM_MM),
            pdf_text(footer)
        );
    }

    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    if !xobjects.is_empty() {
        resources.set("XObject", Object::Dictionary(xobjects));
    }

    let content_id = output.add_object(Stream::new(Dictionary::new(), ops.into_bytes()));

    let mut page_dict = Dictionary::new();
    page_dict.set("Type", Object::Name(b"Page".to_vec()));
    page_dict.set("Parent", Object::Reference(parent));
    page_dict.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(page_w),
            Object::Real(page_h),
        ]),
    );
    page_dict.set("Resources", Object::Dictionary(resources));
    page_dict.set("Contents", Object::Reference(content_id));

    output.add_object(page_dict)
}

fn image_xobject(tile: &Tile) -> Stream {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(tile.width as i64));
    dict.set("Height", Object::Integer(tile.height as i64));
    dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    Stream::new(dict, tile.jpeg.clone()).with_compression(false)
}

/// Draw a tile over the card rectangle grown by the bleed on every side
fn tile_placement(doc: &AssembledDocument, slot: &AssembledSlot, name: &str) -> String {
    let page_h = mm_to_pt(doc.page_height_mm);
    let bleed = doc.bleed_mm;
    let x = mm_to_pt(slot.x_mm - bleed);
    let w = mm_to_pt(slot.w_mm + 2.0 * bleed);
    let h = mm_to_pt(slot.h_mm + 2.0 * bleed);
    let y = page_h - mm_to_pt(slot.y_mm - bleed) - h;
    format!("q {} 0 0 {} {} {} cm /{} Do Q\n", w, h, x, y, name)
}

fn placeholder_ops(
    doc: &AssembledDocument,
    slot: &AssembledSlot,
    label: &str,
    name: &str,
    border_rgb: [u8; 3],
) -> String {
    let page_h = mm_to_pt(doc.page_height_mm);
    let [r, g, b] = rgb_components(border_rgb);
    let x = mm_to_pt(slot.x_mm);
    let w = mm_to_pt(slot.w_mm);
    let h = mm_to_pt(slot.h_mm);
    let y = page_h - mm_to_pt(slot.y_mm) - h;

    let text_x = mm_to_pt(slot.x_mm + PLACEHOLDER_TEXT_INSET_MM);
    let label_y = page_h - mm_to_pt(slot.y_mm + 2.0 * PLACEHOLDER_TEXT_INSET_MM);
    let name_y = label_y - mm_to_pt(PLACEHOLDER_LINE_SPACING_MM);

    let mut ops = String::new();
    let _ = writeln!(
        ops,
        "q {} {} {} RG {} w {} {} {} {} re S Q",
        r,
        g,
        b,
        mm_to_pt(PLACEHOLDER_BORDER_WIDTH_MM),
        x,
        y,
        w,
        h
    );
    for (text, line_y) in [(label, label_y), (name, name_y)] {
        let _ = writeln!(
            ops,
            "BT /F1 {} Tf {} {} {} rg {} {} Td ({}) Tj ET",
            PLACEHOLDER_FONT_SIZE,
            r,
            g,
            b,
            text_x,
            line_y,
            pdf_text(text)
        );
    }
    ops
}

fn rgb_components(rgb: [u8; 3]) -> [f32; 3] {
    rgb.map(|c| c as f32 / 255.0)
}

/// Escape a string for a PDF literal. Characters outside printable ASCII
/// become `?` since the standard font has no glyphs for them.
fn pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}
