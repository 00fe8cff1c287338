//
// pipeline_workflows.rs
// CMR-Curate-rs
//
// End-to-end tests driving anonymization, sorting, cataloguing, validation and the description report over synthetic DICOM trees.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fs;
use std::path::{Path, PathBuf};

use cmr_curate::anonymize::anonymize_tree;
use cmr_curate::catalogue::catalogue;
use cmr_curate::classify::{AxisMatch, Classifier};
use cmr_curate::codec;
use cmr_curate::config::Config;
use cmr_curate::describe::{describe, sequence_overview};
use cmr_curate::dicom_access::{self, ElementAccess};
use cmr_curate::error::StoreError;
use cmr_curate::sort::{sort_tree, UNSORTED_DIR};
use cmr_curate::store::JsonLinesStore;
use cmr_curate::validate::validate_sorted;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use tempfile::{tempdir, TempDir};
use walkdir::WalkDir;

const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";

struct Instance<'a> {
    patient_id: &'a str,
    patient_name: &'a str,
    birth_date: Option<&'a str>,
    study_uid: &'a str,
    series_number: Option<&'a str>,
    description: &'a str,
    sop_uid: String,
}

impl<'a> Instance<'a> {
    fn new(patient_id: &'a str, series_number: Option<&'a str>, description: &'a str, n: u32) -> Self {
        Self {
            patient_id,
            patient_name: "Doe^Jane",
            birth_date: Some("19700101"),
            study_uid: "1.2.826.0.1.3680043.2.1125.10",
            series_number,
            description,
            sop_uid: format!("1.2.826.0.1.3680043.2.1125.10.{n}"),
        }
    }
}

fn put(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

fn write_instance(path: &Path, instance: &Instance) {
    let mut obj = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
    put(&mut obj, dicom_access::PATIENT_NAME, VR::PN, instance.patient_name);
    put(&mut obj, dicom_access::PATIENT_ID, VR::LO, instance.patient_id);
    if let Some(birth_date) = instance.birth_date {
        put(&mut obj, dicom_access::PATIENT_BIRTH_DATE, VR::DA, birth_date);
    }
    put(&mut obj, Tag(0x0008, 0x0080), VR::LO, "General Hospital");
    put(&mut obj, Tag(0x0008, 0x0060), VR::CS, "MR");
    put(&mut obj, dicom_access::STUDY_DATE, VR::DA, "20240115");
    put(&mut obj, dicom_access::SOP_CLASS_UID, VR::UI, MR_IMAGE_STORAGE);
    put(&mut obj, dicom_access::SOP_INSTANCE_UID, VR::UI, &instance.sop_uid);
    put(&mut obj, dicom_access::STUDY_INSTANCE_UID, VR::UI, instance.study_uid);
    put(&mut obj, dicom_access::SERIES_DESCRIPTION, VR::LO, instance.description);
    if let Some(series) = instance.series_number {
        put(&mut obj, dicom_access::SERIES_NUMBER, VR::IS, series);
        let series_uid = format!("{}.{series}", instance.study_uid);
        put(&mut obj, dicom_access::SERIES_INSTANCE_UID, VR::UI, &series_uid);
    }

    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid(MR_IMAGE_STORAGE)
        .media_storage_sop_instance_uid(instance.sop_uid.as_str())
        .build()
        .expect("file meta");
    let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    for elem in obj {
        file_obj.put(elem);
    }
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    file_obj.write_to_file(path).expect("write dicom");
}

struct Workspace {
    _dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        Self { _dir: dir, root }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn store(&self) -> JsonLinesStore {
        JsonLinesStore::new(self.path("record_linkage.jsonl"))
    }

    fn store_lines(&self) -> usize {
        fs::read_to_string(self.path("record_linkage.jsonl"))
            .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count())
            .unwrap_or(0)
    }

    fn anonymize(&self, source: &str, target: &str) -> cmr_curate::models::AnonymizeSummary {
        anonymize_tree(self.store(), &Config::default(), &self.path(source), &self.path(target))
            .expect("anonymize")
    }
}

/// Every file under `root`, relative and sorted.
fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).expect("prefix").to_path_buf())
        .collect();
    files.sort();
    files
}

fn child_dirs(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

fn classifier() -> Classifier {
    Classifier::builtin().expect("rules")
}

#[test]
fn anonymized_output_carries_pseudonym_and_no_identifiers() {
    let ws = Workspace::new();
    write_instance(&ws.path("raw/IM0001.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 1));

    let summary = ws.anonymize("raw", "anon");
    assert_eq!(summary.anonymized, 1);
    assert_eq!(summary.new_identities, 1);
    assert!(summary.skipped.is_empty());

    let outputs = files_under(&ws.path("anon"));
    assert_eq!(outputs.len(), 1);
    let output = &outputs[0];
    assert!(output.starts_with("CMR000001"));
    assert!(output.to_string_lossy().ends_with(".dcm.gz"));

    let obj = codec::open(&ws.path("anon").join(output)).expect("open output");
    assert_eq!(obj.element_text(dicom_access::PATIENT_ID).as_deref(), Some("CMR000001"));
    assert_eq!(obj.element_text(dicom_access::PATIENT_NAME).as_deref(), Some("CMR000001"));
    assert!(!obj.has_element(dicom_access::PATIENT_BIRTH_DATE));
    assert!(!obj.has_element(Tag(0x0008, 0x0080)));
    assert_eq!(obj.element_text(dicom_access::SERIES_NUMBER).as_deref(), Some("3"));
    let sop = obj.element_text(dicom_access::SOP_INSTANCE_UID).expect("sop uid");
    assert!(sop.starts_with("2.25."));

    let store = fs::read_to_string(ws.path("record_linkage.jsonl")).expect("store");
    assert!(!store.contains("MRN-1"));
    assert!(!store.contains("Doe"));
}

#[test]
fn identities_are_stable_across_runs() {
    let ws = Workspace::new();
    write_instance(&ws.path("batch1/a.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 1));
    ws.anonymize("batch1", "anon");

    write_instance(&ws.path("batch2/b.dcm"), &Instance::new("MRN-2", Some("3"), "cine_4ch", 2));
    write_instance(&ws.path("batch2/c.dcm"), &Instance::new("MRN-1", Some("4"), "cine_sax", 3));
    let summary = ws.anonymize("batch2", "anon");

    assert_eq!(summary.anonymized, 2);
    assert_eq!(summary.new_identities, 1);
    assert_eq!(child_dirs(&ws.path("anon")), vec!["CMR000001", "CMR000002"]);
    assert_eq!(files_under(&ws.path("anon/CMR000001")).len(), 2);
    assert_eq!(ws.store_lines(), 2);
}

#[test]
fn ten_file_batch_with_one_malformed_file() {
    let ws = Workspace::new();
    let patients = ["MRN-1", "MRN-2", "MRN-3"];
    for n in 1..=10u32 {
        let path = ws.path(&format!("raw/IM{n:04}.dcm"));
        if n == 7 {
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, b"definitely not a DICOM file").expect("write");
            continue;
        }
        let patient = patients[(n as usize) % patients.len()];
        write_instance(&path, &Instance::new(patient, Some("3"), "cine_4ch", n));
    }

    let summary = ws.anonymize("raw", "anon");
    assert_eq!(summary.anonymized, 9);
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.skipped[0].path.ends_with("IM0007.dcm"));
    assert_eq!(files_under(&ws.path("anon")).len(), 9);
    assert!(ws.store_lines() <= patients.len());
    assert_eq!(summary.new_identities, ws.store_lines());
}

#[test]
fn rerun_produces_no_duplicates_and_no_store_growth() {
    let ws = Workspace::new();
    for n in 1..=3u32 {
        write_instance(
            &ws.path(&format!("raw/IM{n:04}.dcm")),
            &Instance::new("MRN-1", Some("3"), "cine_4ch", n),
        );
    }
    ws.anonymize("raw", "anon");
    let files_before = files_under(&ws.path("anon"));
    let store_before = fs::read(ws.path("record_linkage.jsonl")).expect("store");

    let summary = ws.anonymize("raw", "anon");
    assert_eq!(summary.anonymized, 0);
    assert_eq!(summary.already_anonymized, 3);
    assert_eq!(summary.new_identities, 0);
    assert_eq!(files_under(&ws.path("anon")), files_before);
    assert_eq!(fs::read(ws.path("record_linkage.jsonl")).expect("store"), store_before);
}

#[test]
fn corrupt_store_aborts_before_any_write() {
    let ws = Workspace::new();
    write_instance(&ws.path("raw/a.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 1));
    fs::write(ws.path("record_linkage.jsonl"), "{\"original\": \"abc\"\n").expect("write");

    let err = anonymize_tree(ws.store(), &Config::default(), &ws.path("raw"), &ws.path("anon"))
        .expect_err("corrupt store must abort");
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::Corruption { line: 1, .. })
    ));
    assert!(!ws.path("anon").exists());
}

#[test]
fn lost_store_never_reuses_an_existing_pseudonym() {
    let ws = Workspace::new();
    write_instance(&ws.path("batch1/a.dcm"), &Instance::new("MRN-A", Some("3"), "cine_4ch", 1));
    ws.anonymize("batch1", "anon");
    fs::remove_file(ws.path("record_linkage.jsonl")).expect("remove store");

    write_instance(&ws.path("batch2/b.dcm"), &Instance::new("MRN-B", Some("3"), "cine_4ch", 2));
    let summary = ws.anonymize("batch2", "anon");

    assert_eq!(summary.anonymized, 1);
    assert_eq!(child_dirs(&ws.path("anon")), vec!["CMR000001", "CMR000002"]);
    assert_eq!(files_under(&ws.path("anon/CMR000001")).len(), 1);
    assert_eq!(files_under(&ws.path("anon/CMR000002")).len(), 1);
    let store = fs::read_to_string(ws.path("record_linkage.jsonl")).expect("store");
    assert!(store.contains("CMR000002"));
    assert!(!store.contains("\"CMR000001\""));
}

#[test]
fn patient_id_alone_decides_the_pseudonym() {
    let ws = Workspace::new();
    write_instance(&ws.path("raw/a.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 1));
    let mut other_spelling = Instance::new("MRN-1", Some("4"), "cine_sax", 2);
    other_spelling.patient_name = "DOE^JANE^M";
    other_spelling.birth_date = None;
    write_instance(&ws.path("raw/b.dcm"), &other_spelling);

    let summary = ws.anonymize("raw", "anon");
    assert_eq!(summary.anonymized, 2);
    assert_eq!(summary.new_identities, 1);
    assert_eq!(child_dirs(&ws.path("anon")), vec!["CMR000001"]);
    assert_eq!(files_under(&ws.path("anon/CMR000001")).len(), 2);
}

#[test]
fn files_without_patient_id_are_skipped() {
    let ws = Workspace::new();
    write_instance(&ws.path("raw/a.dcm"), &Instance::new("", Some("3"), "cine_4ch", 1));
    write_instance(&ws.path("raw/b.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 2));

    let summary = ws.anonymize("raw", "anon");
    assert_eq!(summary.anonymized, 1);
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.skipped[0].path.ends_with("a.dcm"));
}

#[test]
fn same_patient_two_series_end_in_distinct_catalogued_directories() {
    let ws = Workspace::new();
    write_instance(&ws.path("raw/a.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 1));
    write_instance(&ws.path("raw/b.dcm"), &Instance::new("MRN-1", Some("5"), "cine_sax", 2));

    let summary = ws.anonymize("raw", "anon");
    assert_eq!(summary.new_identities, 1);

    let sorted = sort_tree(&ws.path("anon"), &ws.path("sorted")).expect("sort");
    assert_eq!(sorted.sorted, 2);

    let catalogued = catalogue(&ws.path("sorted"), &classifier()).expect("catalogue");
    assert_eq!(catalogued.renamed.len(), 2);
    assert!(catalogued.collisions.is_empty());

    let patients = child_dirs(&ws.path("sorted"));
    assert_eq!(patients, vec!["CMR000001"]);
    let studies = child_dirs(&ws.path("sorted/CMR000001"));
    assert_eq!(studies.len(), 1);
    let series = child_dirs(&ws.path("sorted/CMR000001").join(&studies[0]));
    assert_eq!(series, vec!["Series3_CINE_4ch", "Series5_CINE_LVSA"]);
}

#[test]
fn sorting_twice_is_a_noop_including_the_fallback_bucket() {
    let ws = Workspace::new();
    write_instance(&ws.path("raw/a.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 1));
    write_instance(&ws.path("raw/b.dcm"), &Instance::new("MRN-1", None, "localizer", 2));
    ws.anonymize("raw", "anon");

    let first = sort_tree(&ws.path("anon"), &ws.path("sorted")).expect("sort");
    assert_eq!(first.sorted, 1);
    assert_eq!(first.unsorted.len(), 1);
    assert!(first.unsorted[0]
        .parent()
        .is_some_and(|p| p.ends_with(UNSORTED_DIR)));
    let layout = files_under(&ws.path("sorted"));

    let second = sort_tree(&ws.path("anon"), &ws.path("sorted")).expect("sort");
    assert_eq!(second.sorted, 0);
    assert_eq!(second.already_sorted, 1);
    assert_eq!(second.unsorted, first.unsorted);
    assert!(second.conflicts.is_empty());
    assert_eq!(files_under(&ws.path("sorted")), layout);

    // Sorting the sorted tree onto itself keeps every file where it is.
    let in_place = sort_tree(&ws.path("sorted"), &ws.path("sorted")).expect("sort");
    assert_eq!(in_place.sorted, 0);
    assert_eq!(in_place.already_sorted, 1);
    assert_eq!(files_under(&ws.path("sorted")), layout);
}

#[test]
fn sorting_into_a_catalogued_tree_reuses_its_directories() {
    let ws = Workspace::new();
    write_instance(&ws.path("raw/a.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 1));
    ws.anonymize("raw", "anon");
    sort_tree(&ws.path("anon"), &ws.path("sorted")).expect("sort");
    catalogue(&ws.path("sorted"), &classifier()).expect("catalogue");
    let layout = files_under(&ws.path("sorted"));

    write_instance(&ws.path("raw/b.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 2));
    ws.anonymize("raw", "anon");
    let summary = sort_tree(&ws.path("anon"), &ws.path("sorted")).expect("sort");
    assert_eq!(summary.sorted, 1);
    assert_eq!(summary.already_sorted, 1);

    let after = files_under(&ws.path("sorted"));
    assert_eq!(after.len(), layout.len() + 1);
    assert!(after
        .iter()
        .all(|p| p.parent().is_some_and(|d| d.ends_with("Series3_CINE_4ch"))));
}

#[test]
fn cataloguing_twice_leaves_names_unchanged() {
    let ws = Workspace::new();
    write_instance(&ws.path("raw/a.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 1));
    write_instance(&ws.path("raw/b.dcm"), &Instance::new("MRN-1", Some("8"), "diffusion", 2));
    ws.anonymize("raw", "anon");
    sort_tree(&ws.path("anon"), &ws.path("sorted")).expect("sort");

    let first = catalogue(&ws.path("sorted"), &classifier()).expect("catalogue");
    assert_eq!(first.renamed.len(), 2);
    assert_eq!(first.fallback_labels.len(), 1);
    assert!(first.fallback_labels[0].ends_with("Series8_Other_Other"));
    let layout = files_under(&ws.path("sorted"));

    let second = catalogue(&ws.path("sorted"), &classifier()).expect("catalogue");
    assert!(second.renamed.is_empty());
    assert_eq!(second.already_catalogued, 2);
    assert_eq!(files_under(&ws.path("sorted")), layout);
}

#[test]
fn name_collisions_fail_loudly_and_other_series_continue() {
    let ws = Workspace::new();
    let study = ws.path("sorted/CMR000001/20240101_abcd1234");
    write_instance(&study.join("Series3/x.dcm"), &Instance::new("CMR000001", Some("3"), "cine_4ch", 1));
    write_instance(
        &study.join("Series3_CINE_4ch/y.dcm"),
        &Instance::new("CMR000001", Some("3"), "cine_4ch", 2),
    );
    write_instance(&study.join("Series4/z.dcm"), &Instance::new("CMR000001", Some("4"), "cine_sax", 3));

    let summary = catalogue(&ws.path("sorted"), &classifier()).expect("catalogue");
    assert_eq!(summary.collisions.len(), 1);
    assert!(summary.collisions[0].path.ends_with("Series3"));
    assert_eq!(summary.renamed.len(), 1);
    assert_eq!(summary.already_catalogued, 1);
    assert_eq!(
        child_dirs(&study),
        vec!["Series3", "Series3_CINE_4ch", "Series4_CINE_LVSA"]
    );
    assert!(study.join("Series3/x.dcm").exists());
}

#[test]
fn validation_and_description_report_cover_the_sorted_tree() {
    let ws = Workspace::new();
    write_instance(&ws.path("raw/a.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 1));
    write_instance(&ws.path("raw/b.dcm"), &Instance::new("MRN-1", Some("4"), "cine_4ch", 2));
    write_instance(&ws.path("raw/c.dcm"), &Instance::new("MRN-2", Some("5"), "pelvis survey", 3));
    ws.anonymize("raw", "anon");
    sort_tree(&ws.path("anon"), &ws.path("sorted")).expect("sort");

    let report = validate_sorted(&ws.path("anon"), &ws.path("sorted")).expect("validate");
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.checked_folders, 2);

    let rows = describe(&ws.path("sorted"), &classifier()).expect("describe");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].description, "cine_4ch");
    assert_eq!(rows[0].count, 2);
    assert_eq!(rows[0].image_type, "CINE");
    assert_eq!(rows[0].anatomy, "4ch");
    assert_eq!(rows[1].description, "pelvis survey");
    assert_eq!(rows[1].image_type_match, AxisMatch::Other);

    fs::remove_dir_all(ws.path("sorted/CMR000002")).expect("remove");
    let report = validate_sorted(&ws.path("anon"), &ws.path("sorted")).expect("validate");
    assert_eq!(report.missing_in_target, vec!["CMR000002".to_string()]);
}

#[test]
fn per_patient_overview_marks_missing_sequences() {
    let ws = Workspace::new();
    write_instance(&ws.path("raw/a.dcm"), &Instance::new("MRN-1", Some("3"), "cine_4ch", 1));
    write_instance(&ws.path("raw/b.dcm"), &Instance::new("MRN-1", Some("9"), "lge_lvsa", 2));
    write_instance(&ws.path("raw/c.dcm"), &Instance::new("MRN-2", Some("3"), "cine_4ch", 3));
    ws.anonymize("raw", "anon");
    sort_tree(&ws.path("anon"), &ws.path("sorted")).expect("sort");
    catalogue(&ws.path("sorted"), &classifier()).expect("catalogue");

    let overview = sequence_overview(&ws.path("sorted")).expect("overview");
    assert_eq!(overview.descriptions, vec!["cine_4ch", "lge_lvsa"]);
    assert_eq!(overview.patients.len(), 2);
    assert_eq!(overview.patients[0].patient, "CMR000001");
    assert_eq!(overview.patients[0].present, vec![1, 1]);
    assert_eq!(overview.patients[1].patient, "CMR000002");
    assert_eq!(overview.patients[1].present, vec![1, 0]);

    let json = serde_json::to_value(&overview).expect("json");
    assert_eq!(json["patients"][1]["present"], serde_json::json!([1, 0]));
}
