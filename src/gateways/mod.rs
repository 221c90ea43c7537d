pub mod payment;
pub mod sms;

pub use payment::{
    CheckoutRequest, CheckoutResponse, HttpPaymentGateway, PaymentGateway, VerifyData,
    VerifyResponse,
};
pub use sms::{DisabledSmsSender, HttpSmsSender, SmsDelivery, SmsSender};
