use crate::returns::model::Return;

/// Redacts the fields that must never leave the process: the raw itemization
/// payload, both identity-verification secrets, and the purchase-details blob
/// on every item instance. Runs in place, before any serialization or
/// narrative text is built from the aggregate. Idempotent.
pub fn sanitize(retrn: &mut Return) {
    retrn.itemization = None;
    if let Some(identity) = retrn.customer_identity.as_mut() {
        identity.recaptcha_value.clear();
        identity.token.clear();
    }
    for instance in &mut retrn.instances {
        if let Some(purchase) = instance.purchase.as_mut() {
            purchase.details = None;
        }
    }
}
