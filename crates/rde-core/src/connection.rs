//! Connection info (§3, §6.1): a tagged variant discriminated by
//! `vendor_type`, with masking of sensitive fields at every serialisation
//! boundary unless the caller explicitly asks for the unmasked form.

use serde::{Deserialize, Serialize};

const MASK: &str = "****";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorType {
    Memory,
    Postgresql,
    Redshift,
    Snowflake,
    Bigquery,
    Console,
    S3,
    Gcs,
}

impl VendorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorType::Memory => "memory",
            VendorType::Postgresql => "postgresql",
            VendorType::Redshift => "redshift",
            VendorType::Snowflake => "snowflake",
            VendorType::Bigquery => "bigquery",
            VendorType::Console => "console",
            VendorType::S3 => "s3",
            VendorType::Gcs => "gcs",
        }
    }
}

/// Object-store destination layout (§4.5, §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectLayout {
    Staging,
    Hive,
}

/// Parquet compression, configurable per object-store destination (default
/// `None`, per §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParquetCompression {
    #[default]
    None,
    Snappy,
    Gzip,
    Zstd,
}

/// A tagged union over every vendor's connection payload (§6.1). Each
/// variant's auth fields are the ones actually required for that vendor;
/// fields not applicable to a variant simply don't exist on it, rather than
/// being `Option` fields shared across an untagged struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "vendor_type", rename_all = "snake_case")]
pub enum ConnectionInfo {
    Memory {
        #[serde(default)]
        namespace: Option<String>,
    },
    Postgresql {
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
        #[serde(default)]
        target_schema: Option<String>,
    },
    Redshift {
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
        #[serde(default)]
        target_schema: Option<String>,
        #[serde(default)]
        s3_bucket: Option<String>,
        #[serde(default)]
        s3_region: Option<String>,
        #[serde(default)]
        s3_prefix: Option<String>,
        #[serde(default)]
        iam_role: Option<String>,
        #[serde(default)]
        aws_access_key_id: Option<String>,
        #[serde(default)]
        aws_secret_access_key: Option<String>,
    },
    Snowflake {
        user: String,
        access_token: String,
        account: String,
        warehouse: String,
        database: String,
        #[serde(default)]
        target_schema: Option<String>,
        #[serde(default)]
        stage_name: Option<String>,
        #[serde(default)]
        create_stage: bool,
        #[serde(default)]
        delete_stage: bool,
    },
    Bigquery {
        project_id: String,
        service_account: String,
        #[serde(default)]
        target_schema: Option<String>,
        #[serde(default)]
        gcs_bucket_name: Option<String>,
        #[serde(default)]
        gcs_bucket_path: Option<String>,
    },
    Console {
        #[serde(default)]
        limit: Option<usize>,
    },
    S3 {
        s3_bucket: String,
        s3_region: String,
        s3_prefix: String,
        aws_access_key_id: String,
        aws_secret_access_key: String,
        format: ObjectLayout,
        #[serde(default)]
        compression: ParquetCompression,
    },
    Gcs {
        gcs_bucket_name: String,
        gcs_bucket_path: String,
        service_account: String,
        #[serde(default)]
        format: Option<ObjectLayout>,
        #[serde(default)]
        compression: ParquetCompression,
    },
}

impl ConnectionInfo {
    pub fn vendor_type(&self) -> VendorType {
        match self {
            ConnectionInfo::Memory { .. } => VendorType::Memory,
            ConnectionInfo::Postgresql { .. } => VendorType::Postgresql,
            ConnectionInfo::Redshift { .. } => VendorType::Redshift,
            ConnectionInfo::Snowflake { .. } => VendorType::Snowflake,
            ConnectionInfo::Bigquery { .. } => VendorType::Bigquery,
            ConnectionInfo::Console { .. } => VendorType::Console,
            ConnectionInfo::S3 { .. } => VendorType::S3,
            ConnectionInfo::Gcs { .. } => VendorType::Gcs,
        }
    }

    /// Validates that this payload's discriminant matches the parent
    /// Source/Destination record's declared `vendor_type` (§6.1 rule).
    pub fn validate_vendor(&self, declared: VendorType) -> Result<(), String> {
        let actual = self.vendor_type();
        if actual == declared {
            Ok(())
        } else {
            Err(format!(
                "connection_info vendor_type {} does not match declared vendor_type {}",
                actual.as_str(),
                declared.as_str()
            ))
        }
    }

    /// Returns a copy with every sensitive field replaced by `****`. This is
    /// the form used for logging and any serialisation that doesn't
    /// explicitly request the unmasked payload (§8 "Sensitive fields masked").
    pub fn masked(&self) -> ConnectionInfo {
        let mut copy = self.clone();
        match &mut copy {
            ConnectionInfo::Postgresql { password, .. } => *password = MASK.to_string(),
            ConnectionInfo::Redshift {
                password,
                aws_access_key_id,
                aws_secret_access_key,
                ..
            } => {
                *password = MASK.to_string();
                if aws_access_key_id.is_some() {
                    *aws_access_key_id = Some(MASK.to_string());
                }
                if aws_secret_access_key.is_some() {
                    *aws_secret_access_key = Some(MASK.to_string());
                }
            }
            ConnectionInfo::Snowflake { access_token, .. } => *access_token = MASK.to_string(),
            ConnectionInfo::Bigquery { service_account, .. } => {
                *service_account = MASK.to_string()
            }
            ConnectionInfo::S3 {
                aws_access_key_id,
                aws_secret_access_key,
                ..
            } => {
                *aws_access_key_id = MASK.to_string();
                *aws_secret_access_key = MASK.to_string();
            }
            ConnectionInfo::Gcs { service_account, .. } => *service_account = MASK.to_string(),
            ConnectionInfo::Memory { .. } | ConnectionInfo::Console { .. } => {}
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_postgresql_hides_password() {
        let info = ConnectionInfo::Postgresql {
            host: "db.internal".into(),
            port: 5432,
            user: "svc".into(),
            password: "hunter2".into(),
            database: "app".into(),
            target_schema: None,
        };
        let masked = info.masked();
        match masked {
            ConnectionInfo::Postgresql { password, .. } => assert_eq!(password, MASK),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn masked_serialisation_never_leaks_secrets() {
        let info = ConnectionInfo::Snowflake {
            user: "svc".into(),
            access_token: "secret-token".into(),
            account: "acct".into(),
            warehouse: "wh".into(),
            database: "db".into(),
            target_schema: None,
            stage_name: None,
            create_stage: false,
            delete_stage: false,
        };
        let json = serde_json::to_string(&info.masked()).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(json.contains("****"));
    }

    #[test]
    fn vendor_mismatch_fails_validation() {
        let info = ConnectionInfo::Console { limit: None };
        assert!(info.validate_vendor(VendorType::Console).is_ok());
        assert!(info.validate_vendor(VendorType::S3).is_err());
    }
}
