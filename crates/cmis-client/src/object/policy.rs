use cmis_types::property_ids as ids;

object_view!(
    /// A policy that can be applied to controllable objects.
    Policy
);

impl Policy {
    pub fn policy_text(&self) -> Option<String> {
        self.text(ids::POLICY_TEXT)
    }
}
