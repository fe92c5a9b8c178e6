use lead_etl::core::{Cell, ColumnType};
use lead_etl::domain::model::{HeaderPolicy, TextCase};
use lead_etl::domain::ports::DatasetStore;
use lead_etl::{CliConfig, EtlEngine, EtlError, ImportPipeline, LocalStorage, MemoryStore};
use std::io::Read;
use tempfile::TempDir;

const LEADS_CSV: &str = "\
Owner Name,Email,Property Address,List Price,Listed On
  ada lovelace ,ada@example.com,1 Elm St,350000,2024-03-01
,,,,
bo diddley,bo@example.com,22 Oak Ave,n/a,03/15/2024
bo diddley,bo@example.com,22 Oak Ave,n/a,03/15/2024
";

fn cli_config(input_file: &str, output_path: &str) -> CliConfig {
    CliConfig {
        input_file: input_file.to_string(),
        output_path: output_path.to_string(),
        columns: vec![],
        remove_empty_rows: true,
        remove_duplicates: false,
        trim_whitespace: true,
        convert_dates: true,
        parse_numbers: true,
        text_case: TextCase::Original,
        header_policy: HeaderPolicy::Suffix,
        dataset_name: None,
        user_id: "local".to_string(),
        store_path: format!("{}/store.json", output_path),
        verbose: false,
    }
}

fn read_entry(archive: &mut zip::ZipArchive<std::io::Cursor<Vec<u8>>>, name: &str) -> String {
    let mut file = archive.by_name(name).unwrap();
    let mut content = String::new();
    file.read_to_string(&mut content).unwrap();
    content
}

fn open_archive(path: &std::path::Path) -> zip::ZipArchive<std::io::Cursor<Vec<u8>>> {
    let zip_data = std::fs::read(path).unwrap();
    zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap()
}

#[tokio::test]
async fn test_end_to_end_csv_import() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("leads.csv");
    std::fs::write(&input, LEADS_CSV).unwrap();
    let output_path = temp_dir.path().join("out").to_string_lossy().to_string();

    let mut config = cli_config(&input.to_string_lossy(), &output_path);
    config.columns = vec![
        "Owner Name".to_string(),
        "List Price".to_string(),
        "Listed On".to_string(),
    ];
    config.remove_duplicates = true;
    config.text_case = TextCase::Title;

    let storage = LocalStorage::new(output_path.clone());
    let pipeline = ImportPipeline::new(storage, config).unwrap();
    let engine = EtlEngine::new(pipeline);

    let result = engine.run().await.unwrap();
    assert!(result.ends_with("lead_export.zip"));

    let full_path = std::path::Path::new(&output_path).join("lead_export.zip");
    assert!(full_path.exists());

    let mut archive = open_archive(&full_path);
    let csv = read_entry(&mut archive, "cleaned.csv");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Owner Name,List Price,Listed On");
    assert_eq!(lines[1], "Ada Lovelace,350000,2024-03-01");
    assert_eq!(lines[2], "Bo Diddley,N/a,2024-03-15");
    assert_eq!(lines.len(), 3);

    let tsv = read_entry(&mut archive, "cleaned.tsv");
    assert!(tsv.starts_with("Owner Name\tList Price\tListed On\n"));

    // 型別推斷涵蓋所有欄位，不只選取的欄位
    let profiles: serde_json::Value =
        serde_json::from_str(&read_entry(&mut archive, "profile.json")).unwrap();
    let profiles = profiles.as_array().unwrap();
    assert_eq!(profiles.len(), 5);
    let listed = profiles.iter().find(|p| p["name"] == "Listed On").unwrap();
    assert_eq!(listed["inferred_type"], ColumnType::Date.to_string());
    let price = profiles.iter().find(|p| p["name"] == "List Price").unwrap();
    assert_eq!(price["inferred_type"], "mixed");
}

#[tokio::test]
async fn test_end_to_end_xlsx_import_with_dataset() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("leads.xlsx");

    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Name").unwrap();
    sheet.write_string(0, 1, "Email").unwrap();
    sheet.write_string(0, 2, "Price").unwrap();
    sheet.write_string(1, 0, "Ada").unwrap();
    sheet.write_string(1, 1, "ada@example.com").unwrap();
    sheet.write_number(1, 2, 350000.0).unwrap();
    sheet.write_string(2, 0, "Bo").unwrap();
    sheet.write_string(2, 1, "bo@example.com").unwrap();
    sheet.write_number(2, 2, 275000.0).unwrap();
    workbook.save(&input).unwrap();

    let output_path = temp_dir.path().join("out").to_string_lossy().to_string();
    let mut config = cli_config(&input.to_string_lossy(), &output_path);
    config.dataset_name = Some("Spring leads".to_string());
    let store_path = config.store_path.clone();

    let store = MemoryStore::open(&store_path).await.unwrap();
    let pipeline = ImportPipeline::new(LocalStorage::new(output_path.clone()), config)
        .unwrap()
        .with_dataset_store(store, "user-1");
    EtlEngine::new(pipeline).run().await.unwrap();

    // 快照寫入磁碟後可以重新開啟
    let reopened = MemoryStore::open(&store_path).await.unwrap();
    let dataset = reopened.dataset("dataset-1").await.unwrap();
    assert_eq!(dataset.name, "Spring leads");
    assert_eq!(dataset.user_id, "user-1");
    assert_eq!(dataset.original_filename, "leads.xlsx");
    assert_eq!(dataset.total_rows, 2);
    assert_eq!(
        dataset.column_mappings["Price"].column_type,
        ColumnType::Number
    );

    let rows = reopened.rows_for_dataset("dataset-1").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].row_index, 1);
    assert_eq!(rows[1].row_data.get("Name"), Some(&Cell::from("Bo")));
    assert_eq!(rows[1].row_data.get("Price"), Some(&Cell::Number(275000.0)));
}

#[tokio::test]
async fn test_unknown_column_selection_fails_before_writing() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("leads.csv");
    std::fs::write(&input, LEADS_CSV).unwrap();
    let output_path = temp_dir.path().join("out").to_string_lossy().to_string();

    let mut config = cli_config(&input.to_string_lossy(), &output_path);
    config.columns = vec!["Owner Name".to_string(), "Phone".to_string()];

    let pipeline = ImportPipeline::new(LocalStorage::new(output_path.clone()), config).unwrap();
    let err = EtlEngine::new(pipeline).run().await.unwrap_err();

    assert!(matches!(err, EtlError::ValidationError { .. }));
    assert!(!std::path::Path::new(&output_path).join("lead_export.zip").exists());
}

#[tokio::test]
async fn test_header_only_file_is_empty_file_error() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("leads.csv");
    std::fs::write(&input, "Name,Email\n").unwrap();
    let output_path = temp_dir.path().to_string_lossy().to_string();

    let config = cli_config(&input.to_string_lossy(), &output_path);
    let pipeline = ImportPipeline::new(LocalStorage::new(output_path), config).unwrap();
    let err = EtlEngine::new(pipeline).run().await.unwrap_err();

    assert!(matches!(err, EtlError::EmptyFile));
}
