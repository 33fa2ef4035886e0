//! Password strength rules, evaluated in order until the first failure.

/// One independent predicate over a candidate password. `Err` carries the
/// message reported back to the registering client.
pub trait PasswordRule: Send + Sync {
    fn check(&self, password: &str) -> Result<(), String>;
}

/// An ordered list of rules; checking stops at the first violation.
pub struct PasswordPolicy {
    rules: Vec<Box<dyn PasswordRule>>,
}

impl PasswordPolicy {
    pub fn new(rules: Vec<Box<dyn PasswordRule>>) -> Self {
        Self { rules }
    }

    /// The server's registration policy: length, then upper case, then
    /// lower case.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(MinLength(8)),
            Box::new(RequireUppercase),
            Box::new(RequireLowercase),
        ])
    }

    pub fn check(&self, password: &str) -> Result<(), String> {
        for rule in &self.rules {
            rule.check(password)?;
        }
        Ok(())
    }
}

pub struct MinLength(pub usize);

impl PasswordRule for MinLength {
    fn check(&self, password: &str) -> Result<(), String> {
        if password.len() < self.0 {
            return Err(format!(
                "Password must be at least {} characters long.",
                self.0
            ));
        }
        Ok(())
    }
}

pub struct RequireUppercase;

impl PasswordRule for RequireUppercase {
    fn check(&self, password: &str) -> Result<(), String> {
        if !password.chars().any(|c| c.is_uppercase()) {
            return Err("Password must contain upper-case letter.".to_owned());
        }
        Ok(())
    }
}

pub struct RequireLowercase;

impl PasswordRule for RequireLowercase {
    fn check(&self, password: &str) -> Result<(), String> {
        if !password.chars().any(|c| c.is_lowercase()) {
            return Err("Password must contain lower-case letter.".to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::PasswordPolicy;

    #[test]
    fn standard_policy_reports_first_violation() {
        let policy = PasswordPolicy::standard();

        // Too short and missing both cases: the length rule speaks first.
        assert_eq!(
            policy.check("abc"),
            Err("Password must be at least 8 characters long.".to_owned())
        );
        assert_eq!(
            policy.check("lowercase"),
            Err("Password must contain upper-case letter.".to_owned())
        );
        assert_eq!(
            policy.check("UPPERCASE"),
            Err("Password must contain lower-case letter.".to_owned())
        );
        assert_eq!(policy.check("Password1"), Ok(()));
    }

    #[test]
    fn empty_policy_accepts_anything() {
        let policy = PasswordPolicy::new(Vec::new());
        assert_eq!(policy.check(""), Ok(()));
    }
}
