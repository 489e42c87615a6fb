object_view!(
    /// A content-less object with properties only.
    Item
);
