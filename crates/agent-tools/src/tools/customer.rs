//! Customer lookup by contract number.

use async_trait::async_trait;
use database::{customer, Database};
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::names;
use crate::tool::{Tool, ToolArgs, ToolOutput};

pub struct SearchCustomerByContract {
    db: Database,
}

impl SearchCustomerByContract {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for SearchCustomerByContract {
    fn name(&self) -> &str {
        names::SEARCH_CUSTOMER_BY_CONTRACT
    }

    fn description(&self) -> &str {
        "Find the customer registered for a contract number. Returns found=false when nobody is on file."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "contract_number": { "type": "string" }
            }
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let contract = args.contract_number()?;

        let output = match customer::find_by_contract(self.db.pool(), &contract).await? {
            Some(c) => json!({
                "found": true,
                "customer": {
                    "contract_number": c.contract_number,
                    "name": c.name,
                    "email": c.email,
                    "phone": c.phone,
                    "address": c.address,
                    "custom_fields": c.metadata_value(),
                }
            }),
            None => json!({ "found": false, "contract_number": contract }),
        };
        Ok(ToolOutput::success(output))
    }
}
