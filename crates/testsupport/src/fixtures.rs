//! SQL fixtures and value builders used across the integration tests.

use types::Value;

pub fn int(i: i64) -> Value {
    Value::Int(i)
}

pub fn dbl(d: f64) -> Value {
    Value::Double(d)
}

pub fn text(s: &str) -> Value {
    Value::Str(s.to_string())
}

/// Users/Orders pair with a foreign key from Orders.UserID to Users.
pub const SHOP_SCHEMA: &str = "\
    CREATE TABLE Users (UserID INT PRIMARY KEY, UserName STRING, Email STRING); \
    CREATE TABLE Orders (OrderID INT PRIMARY KEY, UserID INT FOREIGN KEY REFERENCES Users(UserID), Amount DOUBLE)";

/// Two users and three orders, as in the join scenarios.
pub const SHOP_DATA: &str = "\
    INSERT INTO Users VALUES (1, 'Alice', 'a@x'); \
    INSERT INTO Users VALUES (2, 'Bob', 'b@x'); \
    INSERT INTO Orders VALUES (101, 1, 99.99); \
    INSERT INTO Orders VALUES (102, 2, 49.99); \
    INSERT INTO Orders VALUES (103, 1, 29.99)";
