fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;

    use filemail_protocol::constants::HttpMethod;
    use filemail_protocol::messages::decode;
    use filemail_protocol::{
        Action, ApiError, ContactsResponse, InitializeResponse, RemoteFile, TransferGetResponse,
        TransferSummary,
    };
    use filemail_transfer::FileDescriptor;
    use serde_json::Value;

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file.
    fn load_fixture(name: &str) -> Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture, re-serializes it and compares the JSON values.
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  ours: {reserialized}"
        );
    }

    // --- Endpoints ---

    #[test]
    fn endpoint_table() {
        let fixture = load_fixture("endpoints.json");
        let table = fixture.as_object().unwrap();
        assert_eq!(table.len(), 19, "one route per action");

        for (name, path) in table {
            let action: Action = serde_json::from_value(Value::String(name.clone()))
                .unwrap_or_else(|e| panic!("unknown action {name}: {e}"));
            assert_eq!(
                action.endpoint(),
                (HttpMethod::Post, path.as_str().unwrap()),
                "route for {name}"
            );
        }
    }

    #[test]
    fn unknown_action_name_is_rejected() {
        let parsed = serde_json::from_value::<Action>(Value::String("teleport".into()));
        assert!(parsed.is_err());
    }

    // --- Error payloads ---

    #[test]
    fn error_payloads_keep_code_and_category() {
        let cases = load_fixture("error_payloads.json");
        for case in cases.as_array().unwrap() {
            let err = ApiError::from_value(&case["body"])
                .unwrap_or_else(|| panic!("not recognised as failure: {}", case["body"]));
            assert_eq!(err.code, case["code"].as_i64().unwrap(), "{}", case["body"]);
            assert_eq!(
                err.category().to_string(),
                case["category"].as_str().unwrap(),
                "{}",
                case["body"]
            );
        }
    }

    #[test]
    fn error_payloads_from_raw_bytes() {
        let err = ApiError::from_body(br#"{"errorcode":4004,"errormessage":"File is deleted"}"#)
            .unwrap();
        assert_eq!(err.code, 4004);
        assert_eq!(err.message, "File is deleted");
        assert!(ApiError::from_body(b"<html>gateway timeout</html>").is_none());
    }

    #[test]
    fn success_payloads_are_not_errors() {
        let cases = load_fixture("success_payloads.json");
        for body in cases.as_array().unwrap() {
            assert!(ApiError::from_value(body).is_none(), "{body}");
        }
    }

    // --- Responses ---

    #[test]
    fn initialize_response_accepts_numeric_id() {
        let resp: InitializeResponse = decode(load_fixture("initialize_response.json")).unwrap();
        assert_eq!(resp.transferid, "81234");
        assert_eq!(resp.transferkey, "a9f3c0");
        assert_eq!(resp.transferurl, "https://8.filemail.com/savefile.ashx");
    }

    #[test]
    fn transfer_get_response_tolerates_mixed_types() {
        let resp: TransferGetResponse = decode(load_fixture("transfer_get_response.json")).unwrap();
        let transfer = resp.transfer;
        assert_eq!(transfer.transferid, "tr-77");
        assert_eq!(transfer.extra.get("subject"), Some(&Value::from("Holiday")));

        let [photo, backup] = transfer.files.as_slice() else {
            panic!("expected two files");
        };
        assert_eq!(photo.fileid, "901");
        assert_eq!(photo.filename, "photos/beach.jpg");
        assert_eq!(photo.filesize, 2_097_152);
        assert!(!photo.compressed);
        assert_eq!(photo.contenttype, "image/jpeg");

        assert_eq!(backup.fileid, "902");
        assert_eq!(backup.filesize, 1024);
        assert!(backup.compressed);
        assert_eq!(backup.md5, None);
        assert_eq!(backup.extra.get("downloads"), Some(&Value::from(3)));
    }

    #[test]
    fn remote_files_become_sent_descriptors() {
        let resp: TransferGetResponse = decode(load_fixture("transfer_get_response.json")).unwrap();
        let files: Vec<_> = resp
            .transfer
            .files
            .iter()
            .map(FileDescriptor::from_remote_data)
            .collect();
        assert!(files.iter().all(|f| f.is_sent() && !f.is_local()));
        assert_eq!(files[0].chunk_position(), files[0].total_size());
        assert_eq!(files[0].md5(), Some("nhB9nTcrtoJr2B01QqQZ1g=="));
        assert_eq!(
            files[1].download_url(),
            Some("https://8.filemail.com/api/file/get?file=902")
        );
    }

    #[test]
    fn fixture_transfer_summary() {
        roundtrip_test::<TransferSummary>("transfer_summary.json");
    }

    #[test]
    fn contacts_response_accepts_numeric_ids() {
        let resp: ContactsResponse = decode(load_fixture("contacts_response.json")).unwrap();
        assert_eq!(resp.contacts.len(), 2);
        assert_eq!(resp.contacts[0].contactid, "11");
        assert_eq!(resp.contacts[1].contactid, "12");
        assert_eq!(resp.contacts[1].name, "");
    }

    // --- Requests ---

    #[test]
    fn upload_request_parameters() {
        let fixture = load_fixture("upload_request.json");
        let remote: RemoteFile = serde_json::from_value(fixture["file"].clone()).unwrap();
        let fd = FileDescriptor::from_remote_data(&remote);

        let params = fd.upload_params(
            fixture["transferid"].as_str().unwrap(),
            fixture["transferkey"].as_str().unwrap(),
            fixture["offset"].as_u64().unwrap(),
        );
        let ours: BTreeMap<&str, &str> = params
            .as_slice()
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect();
        let expected: BTreeMap<&str, &str> = fixture["expected"]
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str().unwrap()))
            .collect();
        assert_eq!(ours, expected);
    }

    #[test]
    fn upload_request_omits_missing_checksum() {
        let fixture = load_fixture("upload_request.json");
        let mut remote: RemoteFile = serde_json::from_value(fixture["file"].clone()).unwrap();
        remote.md5 = None;
        let params = FileDescriptor::from_remote_data(&remote).upload_params("t", "k", 0);
        assert!(!params.contains("md5"));
        assert_eq!(params.len(), 8);
    }
}
