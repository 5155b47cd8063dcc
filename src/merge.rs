//! PDF merging.
//!
//! Inputs are written to uniquely named files inside a temp directory created
//! for the call, merged with lopdf over those paths in input order, and the
//! merged bytes are read back. The directory is removed by its guard on every
//! exit path, success or failure.

use bytes::Bytes;
use lopdf::{dictionary, Document, Object, ObjectId};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Merge the given PDF byte streams into a single document, preserving input
/// order page for page.
pub async fn merge_pdfs(streams: Vec<Vec<u8>>) -> Result<Bytes> {
    if streams.is_empty() {
        return Err(Error::merge("no documents to merge"));
    }

    let dir = tempfile::Builder::new()
        .prefix("pdf_merge")
        .tempdir()
        .map_err(|err| Error::merge(format!("error creating temporary directory: {err}")))?;

    // Unique names keep the concurrent writes collision-free.
    let input_paths: Vec<PathBuf> = streams
        .iter()
        .map(|_| dir.path().join(format!("temp_{}.pdf", Uuid::new_v4())))
        .collect();

    let writes = input_paths.iter().zip(streams).map(|(path, stream)| async move {
        tokio::fs::write(path, stream)
            .await
            .map_err(|err| Error::merge(format!("error writing temporary file: {err}")))
    });
    futures::future::try_join_all(writes).await?;

    let output_path = dir.path().join(format!("merged_{}.pdf", Uuid::new_v4()));

    let merge_inputs = input_paths.clone();
    let merge_output = output_path.clone();
    tokio::task::spawn_blocking(move || merge_files(&merge_inputs, &merge_output))
        .await
        .map_err(|err| Error::merge(format!("merge task failed: {err}")))??;

    let merged = tokio::fs::read(&output_path)
        .await
        .map_err(|err| Error::merge(format!("error reading merged file: {err}")))?;

    Ok(Bytes::from(merged))
}

fn merge_files(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let mut documents = Vec::with_capacity(inputs.len());
    for path in inputs {
        let document = Document::load(path)
            .map_err(|err| Error::merge(format!("error loading {}: {err}", path.display())))?;
        documents.push(document);
    }

    let mut merged = merge_documents(documents)?;
    merged
        .save(output)
        .map_err(|err| Error::merge(format!("error saving merged document: {err}")))?;
    Ok(())
}

/// Standard lopdf merge: renumber every document into one id space, re-parent
/// all pages under one fresh Pages node and give the result a fresh catalog.
fn merge_documents(documents: Vec<Document>) -> Result<Document> {
    let mut max_id: u32 = 1;
    // Pages in visual order: each document's page-tree order, documents in
    // input order. Object ids within a document need not follow page order,
    // so this must stay a Vec, never an id-keyed map.
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut document = Document::with_version("1.5");

    for mut doc in documents {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for &page_id in doc.get_pages().values() {
            if let Ok(page) = doc.get_object(page_id) {
                pages.push((page_id, page.clone()));
            }
        }

        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or("") {
                // Structural nodes are rebuilt below; everything the pages
                // reference is carried over as-is.
                "Catalog" | "Pages" | "Page" | "Outlines" | "Outline" => {}
                _ => {
                    document.objects.insert(object_id, object);
                }
            }
        }
    }

    if pages.is_empty() {
        return Err(Error::merge("no pages found in inputs"));
    }

    let pages_id = document.new_object_id();

    for (object_id, object) in &pages {
        if let Object::Dictionary(dictionary) = object {
            let mut dictionary = dictionary.clone();
            dictionary.set("Parent", Object::Reference(pages_id));
            document
                .objects
                .insert(*object_id, Object::Dictionary(dictionary));
        }
    }

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();

    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as u32,
        }),
    );

    let catalog_id = document.new_object_id();
    document.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        }),
    );

    document.trailer.set("Root", Object::Reference(catalog_id));
    document.max_id = document.objects.len() as u32;
    document.renumber_objects();
    document.compress();

    Ok(document)
}
