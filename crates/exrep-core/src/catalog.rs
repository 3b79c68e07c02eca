//! Canonical invoice/receipt fields defining the report schema.
//!
//! The declaration order below is the column order of every report.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A label that is not part of the field catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown canonical field: {0}")]
pub struct UnknownFieldError(pub String);

macro_rules! canonical_fields {
    ($($variant:ident => $label:literal,)*) => {
        /// A recognized invoice/receipt attribute.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum CanonicalField {
            $($variant,)*
        }

        impl CanonicalField {
            /// Every field, in output column order.
            pub const ALL: &'static [CanonicalField] = &[$(CanonicalField::$variant,)*];

            /// Label used by the analysis service and in report headers.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(CanonicalField::$variant => $label,)*
                }
            }

            /// Look up a service label. Labels outside the catalog yield `None`.
            pub fn from_label(label: &str) -> Option<Self> {
                match label {
                    $($label => Some(CanonicalField::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

canonical_fields! {
    InvoiceReceiptDate => "INVOICE_RECEIPT_DATE",
    InvoiceReceiptId => "INVOICE_RECEIPT_ID",
    TaxPayerId => "TAX_PAYER_ID",
    CustomerNumber => "CUSTOMER_NUMBER",
    AccountNumber => "ACCOUNT_NUMBER",
    VendorName => "VENDOR_NAME",
    ReceiverName => "RECEIVER_NAME",
    VendorAddress => "VENDOR_ADDRESS",
    ReceiverAddress => "RECEIVER_ADDRESS",
    OrderDate => "ORDER_DATE",
    DueDate => "DUE_DATE",
    DeliveryDate => "DELIVERY_DATE",
    PoNumber => "PO_NUMBER",
    PaymentTerms => "PAYMENT_TERMS",
    Total => "TOTAL",
    AmountDue => "AMOUNT_DUE",
    AmountPaid => "AMOUNT_PAID",
    Subtotal => "SUBTOTAL",
    Tax => "TAX",
    ServiceCharge => "SERVICE_CHARGE",
    Gratuity => "GRATUITY",
    PriorBalance => "PRIOR_BALANCE",
    Discount => "DISCOUNT",
    ShippingHandlingCharge => "SHIPPING_HANDLING_CHARGE",
    VendorAbnNumber => "VENDOR_ABN_NUMBER",
    VendorGstNumber => "VENDOR_GST_NUMBER",
    VendorPanNumber => "VENDOR_PAN_NUMBER",
    VendorVatNumber => "VENDOR_VAT_NUMBER",
    ReceiverAbnNumber => "RECEIVER_ABN_NUMBER",
    ReceiverGstNumber => "RECEIVER_GST_NUMBER",
    ReceiverPanNumber => "RECEIVER_PAN_NUMBER",
    ReceiverVatNumber => "RECEIVER_VAT_NUMBER",
    VendorPhone => "VENDOR_PHONE",
    ReceiverPhone => "RECEIVER_PHONE",
    VendorUrl => "VENDOR_URL",
    Item => "ITEM",
    Quantity => "QUANTITY",
    Price => "PRICE",
    UnitPrice => "UNIT_PRICE",
    ProductCode => "PRODUCT_CODE",
    Address => "ADDRESS",
    Name => "NAME",
    AddressBlock => "ADDRESS_BLOCK",
    Street => "STREET",
    City => "CITY",
    State => "STATE",
    Country => "COUNTRY",
    ZipCode => "ZIP_CODE",
}

/// The full catalog in column order.
pub fn canonical_fields() -> &'static [CanonicalField] {
    CanonicalField::ALL
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| UnknownFieldError(s.to_string()))
    }
}

impl Serialize for CanonicalField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CanonicalField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(D::Error::custom)
    }
}
