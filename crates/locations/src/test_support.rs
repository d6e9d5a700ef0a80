use crate::LocationCatalog;

pub(crate) const SAMPLE_CATALOG: &str = r#"{
  "childAdminLevel": "state",
  "children": {
    "Sokoto": {
      "code": "SO",
      "childAdminLevel": "district",
      "children": {
        "WURNO": {
          "code": "22",
          "childAdminLevel": "ward",
          "children": {
            "ACHIDA": { "code": "8", "centroidLat": 13.167, "centroidLng": 5.3959 },
            "DINAWA": { "code": "9", "centroidLat": 13.2, "centroidLng": 5.41 }
          }
        },
        "SOKOTO NORTH": {
          "code": "1",
          "childAdminLevel": "ward",
          "children": {
            "MAGAJIN GARI": { "code": "3" }
          }
        }
      }
    },
    "Kebbi": {
      "code": "KB",
      "childAdminLevel": "district",
      "children": {
        "ALIERO": {
          "code": "1",
          "childAdminLevel": "ward",
          "children": {
            "JIGA": { "code": "1" },
            "DANWARAI": { "code": "5", "centroidLat": 12.3, "centroidLng": 4.45 }
          }
        }
      }
    },
    "Zamfara": {
      "code": "ZA",
      "childAdminLevel": "district",
      "children": {
        "GUSAU": {
          "code": "4",
          "childAdminLevel": "ward",
          "children": {
            "TUDUN WADA": { "code": "2" }
          }
        }
      }
    }
  }
}"#;

pub(crate) fn sample_catalog() -> LocationCatalog {
    LocationCatalog::from_json_str(SAMPLE_CATALOG).expect("sample catalog")
}
